use anyhow::Context;
use std::fs;
use std::path::Path;

/// Moves `tmp` over `dst`, keeping the previous `dst` until the rename lands.
pub fn replace_file(tmp: &Path, dst: &Path) -> anyhow::Result<()> {
    let backup = dst.with_extension("bak");

    if dst.exists() {
        let _ = fs::remove_file(&backup);
        fs::rename(dst, &backup)
            .with_context(|| format!("failed rename {} -> {}", dst.display(), backup.display()))?;
    }

    if let Err(e) = fs::rename(tmp, dst) {
        // Restore the previous file if there was one.
        if backup.exists() {
            let _ = fs::rename(&backup, dst);
        }
        let _ = fs::remove_file(tmp);
        return Err(anyhow::Error::new(e).context(format!(
            "failed rename {} -> {}",
            tmp.display(),
            dst.display()
        )));
    }

    let _ = fs::remove_file(&backup);
    Ok(())
}

/// Serializes `value` as pretty JSON and atomically replaces `path`.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(value).context("encode JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write temp: {}", tmp.display()))?;
    replace_file(&tmp, path).with_context(|| format!("replace file: {}", path.display()))
}
