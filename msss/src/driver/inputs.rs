//! Input discovery, pairing, and staging.

use super::items::Subband;
use msss_shared::errors::{MsssError, MsssResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Subband measurement sets of one beam of `obsid`, ordered by subband id.
///
/// Looks for `<input_dir>/<obsid>/<obsid>_SAP00<beam>_SB<nnn>_uv.MS.dppp`.
pub fn discover_subbands(input_dir: &Path, obsid: &str, beam: usize) -> MsssResult<Vec<Subband>> {
    let dir = input_dir.join(obsid);
    let pattern = Regex::new(&format!(
        r"^{}_SAP00{}_SB(\d+)_uv\.MS\.dppp$",
        regex::escape(obsid),
        beam
    ))
    .map_err(|e| MsssError::Internal(format!("subband pattern: {}", e)))?;

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut subbands = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(captures) = name.to_str().and_then(|n| pattern.captures(n)) else {
            continue;
        };
        let id = captures[1].parse::<u32>().map_err(|_| {
            MsssError::DataShape(format!("bad subband number in {}", entry.path().display()))
        })?;
        subbands.push(Subband::new(id, entry.path()));
    }
    subbands.sort();
    Ok(subbands)
}

/// Check that a target beam covers exactly the calibrator's subbands.
pub fn check_pairing(calibrator: &[Subband], target: &[Subband], beam: usize) -> MsssResult<()> {
    if calibrator.len() != target.len() {
        return Err(MsssError::DataShape(format!(
            "beam {} has {} subbands, calibrator has {}",
            beam,
            target.len(),
            calibrator.len()
        )));
    }
    for (cal, tgt) in calibrator.iter().zip(target) {
        if cal.id != tgt.id {
            return Err(MsssError::DataShape(format!(
                "beam {} subband {} does not match calibrator subband {}",
                beam, tgt, cal
            )));
        }
    }
    Ok(())
}

/// `<skymodel_dir>/<ra>_<dec>.skymodel`, with the phase centre in degrees
/// to two decimals.
pub fn pointing_skymodel(skymodel_dir: &Path, ra: f64, dec: f64) -> PathBuf {
    skymodel_dir.join(format!(
        "{:.2}_{:.2}.skymodel",
        ra.to_degrees(),
        dec.to_degrees()
    ))
}

/// `<skymodel_dir>/<target>.skymodel`, with the target name lowercased and
/// spaces removed.
pub fn calibrator_skymodel(skymodel_dir: &Path, target: &str) -> PathBuf {
    let name: String = target
        .chars()
        .filter(|c| *c != ' ')
        .flat_map(char::to_lowercase)
        .collect();
    skymodel_dir.join(format!("{}.skymodel", name))
}

/// Create `path` and its parents. Existing directories are fine.
pub fn ensure_directory(path: &Path) -> MsssResult<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        MsssError::Storage(format!("failed to create {}: {}", path.display(), e))
    })
}

/// Fail if `path` already exists.
pub fn ensure_absent(path: &Path) -> MsssResult<()> {
    if path.exists() {
        return Err(MsssError::Path(format!(
            "output already exists: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Fail unless `path` exists.
pub fn ensure_present(path: &Path, what: &str) -> MsssResult<()> {
    if !path.exists() {
        return Err(MsssError::Path(format!(
            "{} not found: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

/// Recursively copy a measurement set (a directory tree) to `dest`.
///
/// `dest` must not exist.
pub async fn copy_tree(src: PathBuf, dest: PathBuf) -> MsssResult<()> {
    tokio::task::spawn_blocking(move || copy_tree_blocking(&src, &dest))
        .await
        .map_err(|e| MsssError::Internal(format!("copy task failed: {}", e)))?
}

fn copy_tree_blocking(src: &Path, dest: &Path) -> MsssResult<()> {
    ensure_absent(dest)?;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| {
            MsssError::Storage(format!("failed to read {}: {}", src.display(), e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| MsssError::Internal(format!("walk escaped {}: {}", src.display(), e)))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| {
                MsssError::Storage(format!(
                    "failed to copy {} to {}: {}",
                    entry.path().display(),
                    target.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
    use tempfile::TempDir;

    fn make_subband(dir: &Path, name: &str) {
        let ms = dir.join(name);
        std::fs::create_dir_all(ms.join("ANTENNA")).unwrap();
        std::fs::write(ms.join("table.dat"), b"rows").unwrap();
        std::fs::write(ms.join("ANTENNA/table.dat"), b"names").unwrap();
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let input = TempDir::new().unwrap();
        let obs = input.path().join("L100");
        std::fs::create_dir_all(&obs).unwrap();
        make_subband(&obs, "L100_SAP000_SB002_uv.MS.dppp");
        make_subband(&obs, "L100_SAP000_SB000_uv.MS.dppp");
        make_subband(&obs, "L100_SAP001_SB001_uv.MS.dppp");
        make_subband(&obs, "L100_SAP000_SB001_uv.MS");

        let subbands = discover_subbands(input.path(), "L100", 0).unwrap();
        let ids: Vec<u32> = subbands.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(subbands[0].path.ends_with("L100_SAP000_SB000_uv.MS.dppp"));

        assert_eq!(discover_subbands(input.path(), "L100", 1).unwrap().len(), 1);
        assert!(discover_subbands(input.path(), "L999", 0).unwrap().is_empty());
    }

    #[test]
    fn test_pairing_checks_count_and_identity() {
        let cal = vec![Subband::new(0, "/c0"), Subband::new(1, "/c1")];
        let same = vec![Subband::new(0, "/t0"), Subband::new(1, "/t1")];
        let shifted = vec![Subband::new(1, "/t1"), Subband::new(2, "/t2")];
        let short = vec![Subband::new(0, "/t0")];

        assert!(check_pairing(&cal, &same, 0).is_ok());
        assert!(matches!(
            check_pairing(&cal, &shifted, 0),
            Err(MsssError::DataShape(_))
        ));
        assert!(matches!(
            check_pairing(&cal, &short, 3),
            Err(MsssError::DataShape(_))
        ));
    }

    #[test]
    fn test_skymodel_names() {
        let dir = Path::new("/sky");
        assert_eq!(
            pointing_skymodel(dir, FRAC_PI_2, FRAC_PI_4),
            Path::new("/sky/90.00_45.00.skymodel")
        );
        assert_eq!(
            pointing_skymodel(dir, 2.1537, 0.8494),
            Path::new("/sky/123.40_48.67.skymodel")
        );
        assert_eq!(
            calibrator_skymodel(dir, "3C 196"),
            Path::new("/sky/3c196.skymodel")
        );
    }

    #[tokio::test]
    async fn test_copy_tree() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        make_subband(src.path(), "SB000.MS");

        let out = dest.path().join("SB000.MS");
        copy_tree(src.path().join("SB000.MS"), out.clone())
            .await
            .unwrap();
        assert_eq!(std::fs::read(out.join("ANTENNA/table.dat")).unwrap(), b"names");

        let err = copy_tree(src.path().join("SB000.MS"), out).await.unwrap_err();
        assert!(matches!(err, MsssError::Path(_)));
    }

    #[test]
    fn test_ensure_absent_and_present() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_absent(&dir.path().join("missing")).is_ok());
        assert!(ensure_absent(dir.path()).is_err());
        assert!(ensure_present(dir.path(), "input").is_ok());
        assert!(ensure_present(&dir.path().join("missing"), "input").is_err());
    }
}
