//! Linux procfs snapshot source.
//!
//! Reads the kernel socket tables under `/proc/net`, resolves socket inodes
//! to owning processes through `/proc/<pid>/fd`, and sums host byte counters
//! from `/proc/net/dev`.

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use netpulse_core::{ConnectionKey, ConnectionState, Protocol};
use tracing::trace;

use crate::error::{SourceError, SourceResult};
use crate::snapshot::{RawConnection, RawSnapshot, SnapshotSource};

/// Socket tables read on every poll. Only `tcp` is mandatory, the others
/// are absent on kernels built without IPv6 or UDP diagnostics.
const SOCKET_TABLES: &[(&str, Protocol, bool)] = &[
    ("net/tcp", Protocol::Tcp, true),
    ("net/tcp6", Protocol::Tcp, false),
    ("net/udp", Protocol::Udp, false),
    ("net/udp6", Protocol::Udp, false),
];

/// One row of a `/proc/net/{tcp,udp}*` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEntry {
    pub key: ConnectionKey,
    pub state: ConnectionState,
    pub inode: u64,
}

#[derive(Debug, Clone)]
struct Owner {
    pid: u32,
    name: Option<String>,
}

/// Snapshot source backed by procfs.
///
/// Per-connection byte counters are not exposed by procfs, so every
/// connection is reported without byte attribution.
#[derive(Debug, Clone)]
pub struct ProcNetSource {
    root: PathBuf,
}

impl Default for ProcNetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcNetSource {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }

    /// Read from an alternative procfs root (fixtures, containers).
    pub fn new_with_custom_procfs(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_socket_tables(&self) -> SourceResult<Vec<SocketEntry>> {
        let mut entries = Vec::new();
        for (rel, protocol, required) in SOCKET_TABLES {
            let path = self.root.join(rel);
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                    trace!(path = ?path, "Optional socket table missing");
                    continue;
                }
                Err(e) => return Err(SourceError::from_io(path, e)),
            };
            entries.extend(parse_socket_table(&content, *protocol, &path)?);
        }
        Ok(entries)
    }

    fn read_host_counters(&self) -> SourceResult<(u64, u64)> {
        let path = self.root.join("net/dev");
        let content =
            fs::read_to_string(&path).map_err(|e| SourceError::from_io(path.clone(), e))?;
        parse_net_dev(&content, &path)
    }

    /// Map socket inodes to owning processes.
    ///
    /// Processes whose fd directory cannot be read (other users, exited
    /// mid-scan) are skipped; their sockets stay unattributed.
    fn resolve_owners(&self) -> HashMap<u64, Owner> {
        let mut owners = HashMap::new();
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(_) => return owners,
        };

        for entry in dir.flatten() {
            let pid: u32 = match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                Some(pid) => pid,
                None => continue,
            };
            let fd_dir = match fs::read_dir(entry.path().join("fd")) {
                Ok(fd_dir) => fd_dir,
                Err(_) => continue,
            };

            let mut name: Option<Option<String>> = None;
            for fd in fd_dir.flatten() {
                let Ok(target) = fs::read_link(fd.path()) else {
                    continue;
                };
                let Some(inode) = parse_socket_link(&target.to_string_lossy()) else {
                    continue;
                };
                let name = name
                    .get_or_insert_with(|| read_comm(&entry.path()))
                    .clone();
                owners.entry(inode).or_insert(Owner { pid, name });
            }
        }

        owners
    }
}

impl SnapshotSource for ProcNetSource {
    fn poll_snapshot(&self) -> SourceResult<RawSnapshot> {
        let (bytes_sent, bytes_received) = self.read_host_counters()?;
        let entries = self.read_socket_tables()?;
        let owners = self.resolve_owners();

        let connections = entries
            .into_iter()
            .map(|entry| {
                let conn = RawConnection::new(entry.key, entry.state);
                match owners.get(&entry.inode) {
                    Some(owner) if entry.inode != 0 => RawConnection {
                        pid: Some(owner.pid),
                        process_name: owner.name.clone(),
                        ..conn
                    },
                    _ => conn,
                }
            })
            .collect();

        Ok(RawSnapshot {
            connections,
            bytes_sent,
            bytes_received,
        })
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}

fn read_comm(proc_dir: &Path) -> Option<String> {
    fs::read_to_string(proc_dir.join("comm"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract the inode from an fd link target such as `socket:[12345]`.
fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Parse a `/proc/net/{tcp,tcp6,udp,udp6}` table.
pub fn parse_socket_table(
    content: &str,
    protocol: Protocol,
    path: &Path,
) -> SourceResult<Vec<SocketEntry>> {
    let unexpected = |line: &str| SourceError::UnexpectedLine {
        path: path.to_path_buf(),
        line: line.to_string(),
    };

    let mut entries = Vec::new();
    // First line is the column header
    for line in content.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            return Err(unexpected(line));
        }

        let local = parse_hex_socket_addr(fields[1]).ok_or_else(|| unexpected(line))?;
        let remote = parse_hex_socket_addr(fields[2]).ok_or_else(|| unexpected(line))?;
        let state = match protocol {
            Protocol::Tcp => tcp_state(fields[3]),
            Protocol::Udp => udp_state(fields[3]),
        };
        let inode = fields[9].parse().map_err(|_| unexpected(line))?;

        entries.push(SocketEntry {
            key: ConnectionKey::new(protocol, local, remote),
            state,
            inode,
        });
    }
    Ok(entries)
}

/// Sum transmit/receive bytes over all non-loopback interfaces.
///
/// Returns `(bytes_sent, bytes_received)`.
pub fn parse_net_dev(content: &str, path: &Path) -> SourceResult<(u64, u64)> {
    let mut sent = 0u64;
    let mut received = 0u64;

    // Skip the two header lines
    for line in content.lines().skip(2) {
        let Some((iface, stats)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }

        let values: Vec<&str> = stats.split_whitespace().collect();
        if values.len() < 16 {
            return Err(SourceError::UnexpectedLine {
                path: path.to_path_buf(),
                line: line.to_string(),
            });
        }
        let parse = |s: &str| {
            s.parse::<u64>().map_err(|_| SourceError::UnexpectedLine {
                path: path.to_path_buf(),
                line: line.to_string(),
            })
        };
        received = received.wrapping_add(parse(values[0])?);
        sent = sent.wrapping_add(parse(values[8])?);
    }

    Ok((sent, received))
}

/// Parse `0100007F:1F90` (IPv4) or a 32-digit IPv6 address with port.
///
/// The kernel prints each 32-bit word of the address in host byte order;
/// the port is printed big-endian.
fn parse_hex_socket_addr(field: &str) -> Option<SocketAddr> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let ip = match addr_hex.len() {
        8 => {
            let word = u32::from_str_radix(addr_hex, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_le_bytes()))
        }
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_mut(4).enumerate() {
                let word = u32::from_str_radix(&addr_hex[i * 8..i * 8 + 8], 16).ok()?;
                chunk.copy_from_slice(&word.to_le_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };

    Some(SocketAddr::new(ip, port))
}

fn tcp_state(code: &str) -> ConnectionState {
    match code {
        "01" => ConnectionState::Established,
        "02" => ConnectionState::SynSent,
        "03" => ConnectionState::SynRecv,
        "04" => ConnectionState::FinWait1,
        "05" => ConnectionState::FinWait2,
        "06" => ConnectionState::TimeWait,
        "07" => ConnectionState::Closed,
        "08" => ConnectionState::CloseWait,
        "09" => ConnectionState::LastAck,
        "0A" => ConnectionState::Listen,
        "0B" => ConnectionState::Closing,
        _ => ConnectionState::Unknown,
    }
}

/// UDP sockets only report "connected" (01); anything else has no state.
fn udp_state(code: &str) -> ConnectionState {
    match code {
        "01" => ConnectionState::Established,
        _ => ConnectionState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    const TCP_TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41001 1 0000000000000000 100 0 0 10 0
   1: 0201A8C0:C738 22D8B85D:01BB 01 00000000:00000000 02:000A7E2B 00000000  1000        0 41002 2 0000000000000000 20 4 30 10 -1
";

    const TCP6_TABLE: &str = "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000001000000:0016 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 41003 1 0000000000000000 100 0 0 10 0
";

    const NET_DEV: &str = "Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  900000     100    0    0    0     0          0         0   900000     100    0    0    0     0       0          0
  eth0: 5000000    4000    0    0    0     0          0         0  2000000    3000    0    0    0     0       0          0
 wlan0:    1000      10    0    0    0     0          0         0      500       5    0    0    0     0       0          0
";

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let net = dir.path().join("net");
        fs::create_dir_all(&net).unwrap();
        fs::write(net.join("tcp"), TCP_TABLE).unwrap();
        fs::write(net.join("tcp6"), TCP6_TABLE).unwrap();
        fs::write(net.join("dev"), NET_DEV).unwrap();

        let proc_dir = dir.path().join("4242");
        fs::create_dir_all(proc_dir.join("fd")).unwrap();
        fs::write(proc_dir.join("comm"), "curl\n").unwrap();
        symlink("socket:[41002]", proc_dir.join("fd/3")).unwrap();
        symlink("/dev/null", proc_dir.join("fd/0")).unwrap();
        dir
    }

    #[test]
    fn test_parse_ipv4_addr() {
        let addr = parse_hex_socket_addr("0100007F:1F90").unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());

        let addr = parse_hex_socket_addr("0201A8C0:C738").unwrap();
        assert_eq!(addr, "192.168.1.2:51000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_parse_ipv6_addr() {
        let addr = parse_hex_socket_addr("00000000000000000000000001000000:0016").unwrap();
        assert_eq!(addr, "[::1]:22".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_parse_bad_addr() {
        assert!(parse_hex_socket_addr("XYZ:0016").is_none());
        assert!(parse_hex_socket_addr("0100007F").is_none());
        assert!(parse_hex_socket_addr("0100:0016").is_none());
    }

    #[test]
    fn test_parse_socket_table() {
        let entries = parse_socket_table(TCP_TABLE, Protocol::Tcp, Path::new("tcp")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].state, ConnectionState::Listen);
        assert!(entries[0].key.is_unconnected());
        assert_eq!(entries[1].state, ConnectionState::Established);
        assert_eq!(entries[1].key.remote.port(), 443);
        assert_eq!(entries[1].inode, 41002);
    }

    #[test]
    fn test_parse_socket_table_rejects_truncated_line() {
        let content = "header\n   0: 0100007F:1F90 00000000:0000 0A\n";
        let err = parse_socket_table(content, Protocol::Tcp, Path::new("tcp")).unwrap_err();
        assert!(matches!(err, SourceError::UnexpectedLine { .. }));
    }

    #[test]
    fn test_udp_states() {
        assert_eq!(udp_state("07"), ConnectionState::Unknown);
        assert_eq!(udp_state("01"), ConnectionState::Established);
        assert_eq!(tcp_state("06"), ConnectionState::TimeWait);
        assert_eq!(tcp_state("FF"), ConnectionState::Unknown);
    }

    #[test]
    fn test_parse_net_dev_skips_loopback() {
        let (sent, received) = parse_net_dev(NET_DEV, Path::new("dev")).unwrap();
        assert_eq!(sent, 2_000_500);
        assert_eq!(received, 5_001_000);
    }

    #[test]
    fn test_parse_socket_link() {
        assert_eq!(parse_socket_link("socket:[41002]"), Some(41002));
        assert_eq!(parse_socket_link("pipe:[41002]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);
    }

    #[test]
    fn test_poll_snapshot_from_fixture() {
        let dir = fixture();
        let source = ProcNetSource::new_with_custom_procfs(dir.path().to_path_buf());
        assert_eq!(source.root(), dir.path());

        let snapshot = source.poll_snapshot().unwrap();
        assert_eq!(snapshot.bytes_sent, 2_000_500);
        assert_eq!(snapshot.bytes_received, 5_001_000);
        assert_eq!(snapshot.connections.len(), 3);

        let owned = snapshot
            .connections
            .iter()
            .find(|c| c.key.remote.port() == 443)
            .unwrap();
        assert_eq!(owned.pid, Some(4242));
        assert_eq!(owned.process_name.as_deref(), Some("curl"));
        assert_eq!(owned.bytes_sent, None);

        let listener = snapshot
            .connections
            .iter()
            .find(|c| c.key.local.port() == 8080)
            .unwrap();
        assert_eq!(listener.pid, None);
    }

    #[test]
    fn test_owner_without_comm_keeps_pid_only() {
        let dir = fixture();
        fs::remove_dir_all(dir.path().join("4242")).unwrap();
        let proc_dir = dir.path().join("777");
        fs::create_dir_all(proc_dir.join("fd")).unwrap();
        symlink("socket:[41002]", proc_dir.join("fd/3")).unwrap();

        let source = ProcNetSource::new_with_custom_procfs(dir.path().to_path_buf());
        let snapshot = source.poll_snapshot().unwrap();
        let owned = snapshot
            .connections
            .iter()
            .find(|c| c.key.remote.port() == 443)
            .unwrap();
        assert_eq!(owned.pid, Some(777));
        assert_eq!(owned.process_name, None);
    }

    #[test]
    fn test_blank_comm_is_unresolved() {
        let dir = fixture();
        fs::write(dir.path().join("4242/comm"), "\n").unwrap();

        let source = ProcNetSource::new_with_custom_procfs(dir.path().to_path_buf());
        let snapshot = source.poll_snapshot().unwrap();
        let owned = snapshot
            .connections
            .iter()
            .find(|c| c.key.remote.port() == 443)
            .unwrap();
        assert_eq!(owned.pid, Some(4242));
        assert_eq!(owned.process_name, None);
    }

    #[test]
    fn test_missing_tcp_table_is_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("net")).unwrap();
        fs::write(dir.path().join("net/dev"), NET_DEV).unwrap();

        let source = ProcNetSource::new_with_custom_procfs(dir.path().to_path_buf());
        let err = source.poll_snapshot().unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
