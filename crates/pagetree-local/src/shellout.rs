//! Opportunistic shellouts to local OCR tooling.
//!
//! Tools are used when present, bounded by a timeout and an output cap. Failures
//! are stable `&'static str` codes so callers can surface them without parsing.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn timeout_from_env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default_ms)
        .clamp(50, 300_000);
    Duration::from_millis(ms)
}

pub fn max_chars_from_env(key: &str, default_chars: usize) -> usize {
    env_usize(key, default_chars).clamp(200, 2_000_000)
}

pub fn which(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) {
            let cand = dir.join(format!("{bin}.exe"));
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    None
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

/// Run a command and capture stdout (bounded) with a coarse timeout.
///
/// stdout is drained on a helper thread so a chatty child cannot block on a
/// full pipe while we poll for exit.
pub fn run_stdout_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_stdout_bytes: usize,
) -> Result<Vec<u8>, &'static str> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "shellout_tool_not_found"
        } else {
            "shellout_spawn_failed"
        }
    })?;

    let reader = child
        .stdout
        .take()
        .map(|s| std::thread::spawn(move || read_capped(s, max_stdout_bytes)));

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|_| "shellout_wait_failed")? {
            if !status.success() {
                return Err("shellout_nonzero_exit");
            }
            break;
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err("shellout_timeout");
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    match reader {
        Some(h) => h
            .join()
            .map_err(|_| "shellout_read_failed")?
            .map_err(|_| "shellout_read_failed"),
        None => Ok(Vec::new()),
    }
}

/// Read to EOF, keeping the first `cap` bytes. The rest is drained and
/// dropped so the writer never sees a closed pipe.
pub fn read_capped<R: std::io::Read>(mut r: R, cap: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let room = cap.saturating_sub(out.len());
        out.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok(out)
}

pub fn write_temp_file(
    bytes: &[u8],
    suffix: &str,
) -> Result<tempfile::NamedTempFile, &'static str> {
    let mut tmp = tempfile::Builder::new()
        .prefix("pagetree-")
        .suffix(suffix)
        .tempfile()
        .map_err(|_| "shellout_tempfile_failed")?;
    use std::io::Write;
    tmp.write_all(bytes)
        .map_err(|_| "shellout_tempfile_write_failed")?;
    Ok(tmp)
}

/// Temp-file suffix so the OCR engine can sniff the image format.
pub fn image_suffix(mimetype: Option<&str>, original_name: &str) -> &'static str {
    let ct = mimetype.unwrap_or("").trim().to_ascii_lowercase();
    let name = original_name.to_ascii_lowercase();
    if ct.starts_with("image/png") || name.ends_with(".png") {
        ".png"
    } else if ct.starts_with("image/jpeg") || name.ends_with(".jpg") || name.ends_with(".jpeg") {
        ".jpg"
    } else if ct.starts_with("image/webp") || name.ends_with(".webp") {
        ".webp"
    } else if ct.starts_with("image/gif") || name.ends_with(".gif") {
        ".gif"
    } else if ct.starts_with("image/tiff") || name.ends_with(".tif") || name.ends_with(".tiff") {
        ".tif"
    } else if ct.starts_with("image/bmp") || name.ends_with(".bmp") {
        ".bmp"
    } else {
        ".img"
    }
}

/// OCR knobs, resolved once by the caller and passed down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrConfig {
    pub enabled: bool,
    pub timeout: Duration,
    pub max_chars: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_millis(30_000),
            max_chars: 200_000,
        }
    }
}

impl OcrConfig {
    /// `PAGETREE_OCR=off` disables OCR (anything else means `auto`);
    /// `PAGETREE_OCR_TIMEOUT_MS` and `PAGETREE_OCR_MAX_CHARS` bound it.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            enabled: env("PAGETREE_OCR").as_deref() != Some("off"),
            timeout: timeout_from_env_ms("PAGETREE_OCR_TIMEOUT_MS", d.timeout.as_millis() as u64),
            max_chars: max_chars_from_env("PAGETREE_OCR_MAX_CHARS", d.max_chars),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// OCR an image with the local `tesseract` binary (`tesseract <file> stdout`).
pub fn tesseract_ocr(
    bytes: &[u8],
    mimetype: Option<&str>,
    original_name: &str,
    cfg: &OcrConfig,
) -> Result<String, &'static str> {
    if !cfg.enabled {
        return Err("ocr_disabled");
    }
    if !has("tesseract") {
        return Err("tesseract_not_found");
    }
    let max_stdout_bytes = cfg.max_chars.saturating_mul(4).clamp(1_000, 8_000_000);
    let tmp = write_temp_file(bytes, image_suffix(mimetype, original_name))?;
    let in_path = tmp.path().to_string_lossy().to_string();

    let mut cmd = Command::new("tesseract");
    cmd.arg(&in_path).arg("stdout");
    let out = run_stdout_bounded(cmd, cfg.timeout, max_stdout_bytes)?;
    let s = String::from_utf8_lossy(&out).to_string();
    Ok(s.chars().take(cfg.max_chars).collect())
}
