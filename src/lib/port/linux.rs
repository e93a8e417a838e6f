use glob::glob;
use std::fs;

/// True when any process holds a file descriptor on `port_name`.
pub fn is_port_open(port_name: &str) -> bool {
    let paths = match glob("/proc/[0-9]*/fd/*") {
        Ok(paths) => paths,
        Err(_) => return false,
    };

    paths
        .filter_map(|p| p.ok())
        .filter_map(|path| fs::read_link(path).ok())
        .any(|link| link.to_str() == Some(port_name))
}
