// region/descriptor.rs - Region Descriptor File
//
// Accepted shapes, tried in order:
//   {"left": L, "top": T, "right": R, "bottom": B}
//   {"x": X, "y": Y, "width": W, "height": H}
// Extra keys are ignored. Values are integers and may be negative.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{RegionError, RegionResult};
use crate::app::Region;
use crate::constants::region::DEFAULT_FILE_NAME;

/// The two descriptor shapes, edges first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RegionDescriptor {
    Edges { left: i32, top: i32, right: i32, bottom: i32 },
    OriginSize { x: i32, y: i32, width: i32, height: i32 },
}

impl RegionDescriptor {
    pub fn to_region(self) -> Region {
        match self {
            RegionDescriptor::Edges { left, top, right, bottom } => Region::new(left, top, right, bottom),
            RegionDescriptor::OriginSize { x, y, width, height } => Region::from_origin_size(x, y, width, height),
        }
    }
}

/// On-disk form written by [`write_descriptor`]: both shapes plus a timestamp
#[derive(Debug, Serialize)]
struct DescriptorFile {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    ts: f64,
}

/// Parse descriptor text into a non-empty region
pub fn parse_descriptor(text: &str) -> RegionResult<Region> {
    // Windows editors and PowerShell 5 prefix UTF-8 output with a BOM
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let descriptor: RegionDescriptor = serde_json::from_str(text)?;
    let region = descriptor.to_region();
    if region.is_empty() {
        return Err(RegionError::Empty(region));
    }
    Ok(region)
}

/// Read and parse the descriptor at `path`
pub fn read_descriptor(path: &Path) -> RegionResult<Region> {
    let text = fs::read_to_string(path).map_err(|source| RegionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_descriptor(&text)
}

/// Atomically replace the descriptor at `path` (temp file + rename)
pub fn write_descriptor(path: &Path, region: &Region) -> RegionResult<()> {
    let io_err = |source| RegionError::Io { path: path.to_path_buf(), source };

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    let file = DescriptorFile {
        x: region.left,
        y: region.top,
        width: region.width(),
        height: region.height(),
        left: region.left,
        top: region.top,
        right: region.right,
        bottom: region.bottom,
        ts,
    };
    let json = serde_json::to_string(&file)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    {
        let mut out = fs::File::create(&tmp).map_err(io_err)?;
        out.write_all(json.as_bytes()).map_err(io_err)?;
        out.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)
}

/// Where the selector writes the descriptor when nothing overrides it
pub fn default_descriptor_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ScratchDir;

    #[test]
    fn parses_edges() {
        let region = parse_descriptor(r#"{"left":10,"top":20,"right":110,"bottom":220}"#).unwrap();
        assert_eq!(region, Region::new(10, 20, 110, 220));
    }

    #[test]
    fn parses_edges_after_byte_order_mark() {
        let region = parse_descriptor("\u{feff}{\"left\":10,\"top\":20,\"right\":110,\"bottom\":220}").unwrap();
        assert_eq!(region, Region::new(10, 20, 110, 220));

        let dir = ScratchDir::new("bom");
        let path = dir.path().join("region.json");
        fs::write(&path, b"\xef\xbb\xbf{\"x\":1,\"y\":2,\"width\":3,\"height\":4}").unwrap();
        assert_eq!(read_descriptor(&path).unwrap(), Region::new(1, 2, 4, 6));
    }

    #[test]
    fn parses_origin_and_size() {
        let region = parse_descriptor(r#"{"x":10,"y":20,"width":100,"height":200}"#).unwrap();
        assert_eq!(region, Region::new(10, 20, 110, 220));
    }

    #[test]
    fn incomplete_edges_are_malformed() {
        let err = parse_descriptor(r#"{"left":10,"top":20}"#).unwrap_err();
        assert!(matches!(err, RegionError::Malformed(_)));
    }

    #[test]
    fn edges_win_when_both_shapes_present() {
        let text = r#"{"x":0,"y":0,"width":5,"height":5,"left":1,"top":2,"right":3,"bottom":4}"#;
        assert_eq!(parse_descriptor(text).unwrap(), Region::new(1, 2, 3, 4));
    }

    #[test]
    fn extra_keys_and_negative_values() {
        let text = r#"{"ts": 1712345678.25, "monitor": "DISPLAY1", "x":-1920,"y":-10,"width":800,"height":600}"#;
        assert_eq!(parse_descriptor(text).unwrap(), Region::new(-1920, -10, -1120, 590));
    }

    #[test]
    fn rejects_non_integers_and_garbage() {
        assert!(parse_descriptor(r#"{"left":1.5,"top":0,"right":10,"bottom":10}"#).is_err());
        assert!(parse_descriptor(r#"{"left":"1","top":0,"right":10,"bottom":10}"#).is_err());
        assert!(parse_descriptor("").is_err());
        assert!(parse_descriptor("not json").is_err());
    }

    #[test]
    fn rejects_empty_regions() {
        let err = parse_descriptor(r#"{"left":10,"top":10,"right":10,"bottom":50}"#).unwrap_err();
        assert!(matches!(err, RegionError::Empty(_)));
        let err = parse_descriptor(r#"{"x":0,"y":0,"width":100,"height":-5}"#).unwrap_err();
        assert!(matches!(err, RegionError::Empty(_)));
    }

    #[test]
    fn write_then_read_both_shapes() {
        let dir = ScratchDir::new("descriptor");
        let path = dir.path().join("region.json");
        let region = Region::new(-5, 7, 300, 400);

        write_descriptor(&path, &region).unwrap();
        assert_eq!(read_descriptor(&path).unwrap(), region);

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["width"], 305);
        assert_eq!(value["height"], 393);
        assert!(!dir.path().join("region.json.tmp").exists());

        // Overwrites in place
        write_descriptor(&path, &Region::new(0, 0, 1, 1)).unwrap();
        assert_eq!(read_descriptor(&path).unwrap(), Region::new(0, 0, 1, 1));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = ScratchDir::new("descriptor_missing");
        let err = read_descriptor(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, RegionError::Io { .. }));
    }
}
