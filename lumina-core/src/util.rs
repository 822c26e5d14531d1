//! Small shared helpers.

/// Resident set size of the current process in bytes, read from
/// `/proc/self/status`. Returns `None` off Linux or when the file is
/// unreadable; callers treat that as "unknown", never as zero.
pub fn current_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_is_readable_on_linux() {
        if cfg!(target_os = "linux") {
            assert!(current_rss_bytes().unwrap_or(0) > 0);
        }
    }
}
