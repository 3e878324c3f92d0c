use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::*;

const WRITE_BUFFER_SIZE: usize = 65536;

/// Builds the destination path `<prefix>_<name>.1D`.
pub fn output_path(prefix: &Path, name: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push("_");
    path.push(name);
    path.push(".1D");
    PathBuf::from(path)
}

/// Fails with `OutputExists` if `path` is present and overwriting is off.
pub fn check_destination(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(PhysioError::OutputExists(path.to_path_buf()));
    }
    Ok(())
}

/// Writes a trace as line-delimited integers.
pub fn write_trace(path: &Path, trace: &Trace) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    for value in trace.iter() {
        writeln!(writer, "{}", value)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), samples = trace.len(), "wrote output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn appends_channel_name_to_prefix() {
        let path = output_path(Path::new("/data/run01"), "resp");
        assert_eq!(path, PathBuf::from("/data/run01_resp.1D"));
    }

    #[test]
    fn writes_one_value_per_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.1D");
        write_trace(&path, &Array1::from(vec![3, -1, 5000])).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "3\n-1\n5000\n");
    }

    #[test]
    fn existing_output_needs_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.1D");
        fs::write(&path, "old\n").unwrap();

        assert!(matches!(
            check_destination(&path, false),
            Err(PhysioError::OutputExists(_))
        ));
        assert!(check_destination(&path, true).is_ok());
        assert!(check_destination(&dir.path().join("new.1D"), false).is_ok());
    }
}
