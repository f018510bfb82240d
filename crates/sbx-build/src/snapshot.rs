//! Whole-network snapshot persistence.

use std::fs;
use std::path::Path;

use sbx_core::{Network, SbxError, SbxResult};

/// Serialize the full network (element and result tables) to one file.
pub fn save_network(net: &Network, path: &Path) -> SbxResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(net)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a network snapshot, verifying existence first.
pub fn load_network(path: &Path) -> SbxResult<Network> {
    if !path.is_file() {
        return Err(SbxError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("network snapshot {} does not exist", path.display()),
        )));
    }
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(SbxError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, Load};

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");

        let mut net = Network::new("snapshot-test");
        net.bus.push(Bus {
            name: "Bus 0".into(),
            vn_kv: 380.0,
            zone: 1,
            ..Bus::default()
        });
        net.load.push(Load {
            bus: 0,
            p_mw: 12.5,
            ..Load::default()
        });

        save_network(&net, &path).unwrap();
        let back = load_network(&path).unwrap();
        assert_eq!(back, net);
    }

    #[test]
    fn test_missing_snapshot_is_io_error() {
        let err = load_network(Path::new("/no/such/net.json")).unwrap_err();
        assert!(matches!(err, SbxError::Io(_)));
    }
}
