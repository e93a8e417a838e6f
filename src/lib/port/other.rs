// TODO: detect ports held by other processes on macOS and Windows
pub fn is_port_open(_port_name: &str) -> bool {
    false
}
