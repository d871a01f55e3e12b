//! Mount path resolution
//!
//! Given a block device node, finds its mount directory by scanning the
//! system mount table once after a fixed grace period. The grace period
//! exists because the kernel event for a partition can arrive before the
//! mount table reflects the automount; a device that mounts slower than the
//! grace period yields an empty mount path for that notification. This is a
//! deliberate one-shot heuristic with no retry.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Default mount table on Linux
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/mounts";

/// How a device node is compared against the mount table's fsname field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Exact equality; used for hotplug events, where the partition node is
    /// authoritative
    Exact,
    /// The fsname starts with the device node; used during startup
    /// enumeration, where udev may report a composite/alias node (the whole
    /// disk rather than the mounted partition)
    Prefix,
}

#[derive(Debug, Clone)]
pub struct MountResolver {
    table_path: PathBuf,
    grace: Duration,
}

impl MountResolver {
    pub fn new(table_path: impl Into<PathBuf>, grace: Duration) -> Self {
        Self {
            table_path: table_path.into(),
            grace,
        }
    }

    /// Resolve the mount directory for `dev_node`, or an empty string.
    ///
    /// Sleeps the grace period, then scans every record once; later matches
    /// overwrite earlier ones. An unreadable table is logged and yields an
    /// empty path.
    pub fn resolve(&self, dev_node: &str, mode: MatchMode) -> String {
        if !self.grace.is_zero() {
            thread::sleep(self.grace);
        }

        let table = match fs::read_to_string(&self.table_path) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    "cannot read mount table {}: {}",
                    self.table_path.display(),
                    e
                );
                return String::new();
            }
        };

        let mut mount_path = String::new();
        for line in table.lines() {
            let mut fields = line.split_whitespace();
            let (Some(fsname), Some(dir)) = (fields.next(), fields.next()) else {
                continue;
            };

            let hit = match mode {
                MatchMode::Exact => fsname == dev_node,
                MatchMode::Prefix => fsname.starts_with(dev_node),
            };
            if hit {
                mount_path = unescape_mount_field(dir);
            }
        }

        mount_path
    }
}

/// Decode the octal escapes the kernel uses for whitespace in mount fields
/// (`\040` space, `\011` tab, `\012` newline, `\134` backslash).
fn unescape_mount_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3
            && let Ok(code) = u8::from_str_radix(&digits, 8)
        {
            out.push(code as char);
            chars.nth(2);
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const NO_GRACE: Duration = Duration::ZERO;

    fn mount_table(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp mount table");
        file.write_all(contents.as_bytes()).expect("write table");
        file
    }

    #[test]
    fn test_exact_match() {
        let table = mount_table(
            "sysfs /sys sysfs rw,nosuid 0 0\n\
             /dev/sdb1 /media/usb vfat rw,relatime 0 0\n\
             /dev/sda1 / ext4 rw 0 0\n",
        );
        let resolver = MountResolver::new(table.path(), NO_GRACE);

        assert_eq!(resolver.resolve("/dev/sdb1", MatchMode::Exact), "/media/usb");
        assert_eq!(resolver.resolve("/dev/sdb", MatchMode::Exact), "");
    }

    #[test]
    fn test_prefix_match_tolerates_alias_node() {
        let table = mount_table("/dev/sdb1 /media/usb vfat rw 0 0\n");
        let resolver = MountResolver::new(table.path(), NO_GRACE);

        // Startup enumeration hands us the whole-disk node.
        assert_eq!(
            resolver.resolve("/dev/sdb", MatchMode::Prefix),
            "/media/usb"
        );
    }

    #[test]
    fn test_last_match_wins() {
        let table = mount_table(
            "/dev/sdb1 /media/first vfat rw 0 0\n\
             /dev/sdb1 /media/second vfat rw 0 0\n",
        );
        let resolver = MountResolver::new(table.path(), NO_GRACE);

        assert_eq!(
            resolver.resolve("/dev/sdb1", MatchMode::Exact),
            "/media/second"
        );
    }

    #[test]
    fn test_unreadable_table_yields_empty() {
        let resolver = MountResolver::new("/nonexistent/mounts", NO_GRACE);

        assert_eq!(resolver.resolve("/dev/sdb1", MatchMode::Exact), "");
    }

    #[test]
    fn test_escaped_mount_dir() {
        let table = mount_table("/dev/sdb1 /media/usb\\040stick vfat rw 0 0\n");
        let resolver = MountResolver::new(table.path(), NO_GRACE);

        assert_eq!(
            resolver.resolve("/dev/sdb1", MatchMode::Exact),
            "/media/usb stick"
        );
    }

    #[test]
    fn test_unescape_passthrough() {
        assert_eq!(unescape_mount_field("/media/usb"), "/media/usb");
        assert_eq!(unescape_mount_field("a\\040b"), "a b");
        assert_eq!(unescape_mount_field("tail\\04"), "tail\\04");
        assert_eq!(unescape_mount_field("back\\134slash"), "back\\slash");
    }
}
