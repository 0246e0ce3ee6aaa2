use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Local;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error_handling::utils::io_error;
use crate::error_handling::FragmentError;
use crate::task_queue::parallel_map;

pub const LOG_FILE: &str = "valuefragments.log";
/// Read size used by [`hashfile`].
pub const HASH_CHUNK_LEN: usize = 128 * 4096;
/// Default freshness window for [`file_exists_current`] and [`filecache`].
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Returns the data directory. Uses VALUEFRAGMENTS_DATA_DIR if set;
/// otherwise `<home>/.valuefragments`.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("VALUEFRAGMENTS_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".valuefragments")
}

pub fn init_data_dir() -> io::Result<PathBuf> {
    let data_dir = get_data_dir();
    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

fn is_quiet() -> bool {
    env::var("VALUEFRAGMENTS_QUIET")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Print `[timestamp] message` (unless quiet) and append it to the log file
/// in the data directory.
pub fn log(message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let log_message = format!("[{}] {}", timestamp, message);

    if !is_quiet() {
        println!("{}", log_message);
    }

    let log_path = get_data_dir().join(LOG_FILE);
    // Append-only; a missing data dir just means no file log.
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = writeln!(file, "{}", log_message);
    }
}

pub fn log_error(message: &str) {
    eprintln!("{}", message);
    log(message);
}

/// OS-level id of the calling thread, as shown in log lines.
pub fn thread_native_id() -> u64 {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: gettid has no preconditions and cannot fail.
        unsafe { libc::syscall(libc::SYS_gettid) as u64 }
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        // SAFETY: pthread_self has no preconditions and cannot fail.
        unsafe { libc::pthread_self() as usize as u64 }
    }
    #[cfg(not(unix))]
    {
        u64::from(std::process::id())
    }
}

/// Binary representation of `number` without `0b`, zero-padded to `digits`.
/// Longer representations are not truncated.
pub fn int2bin(number: u64, digits: usize) -> String {
    format!("{:0width$b}", number, width = digits)
}

/// True if `path` exists and was modified less than `max_age` ago.
pub fn file_exists_current(path: &Path, max_age: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < max_age,
        // modified in the future: treat as fresh
        Err(_) => true,
    }
}

/// Make sure `path` holds current content, then return `process(path)`.
///
/// When the file is missing or older than `max_age` it is rewritten from the
/// reader returned by `refresh`.
pub fn filecache<R, T, G, P>(
    path: &Path,
    refresh: G,
    process: P,
    max_age: Duration,
) -> Result<T, FragmentError>
where
    R: Read,
    G: FnOnce() -> io::Result<R>,
    P: FnOnce(&Path) -> T,
{
    if !file_exists_current(path, max_age) {
        let path_str = path.to_string_lossy();
        let mut source = refresh().map_err(|e| io_error("filecache refresh", Some(&path_str), e))?;
        let mut target = File::create(path).map_err(|e| io_error("filecache create", Some(&path_str), e))?;
        io::copy(&mut source, &mut target)
            .map_err(|e| io_error("filecache copy", Some(&path_str), e))?;
        info!("File {} refreshed.", path.display());
    }
    Ok(process(path))
}

/// All files below `base`, deepest directories first. Unreadable directories
/// are skipped.
pub fn recurse_files_in_folder(base: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files(base, &mut files);
    files
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("skipping {}: {}", dir.display(), e);
            return;
        }
    };
    let mut here = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => collect_files(&path, files),
            Ok(_) => here.push(path),
            Err(_) => {}
        }
    }
    here.sort();
    files.extend(here);
}

/// Value for an HTTP `Authorization` header using Basic auth.
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", user, password)))
}

/// SHA-256 hex digest of a file, read in chunks of `chunk_len` bytes.
pub fn hashfile(path: &Path, chunk_len: usize) -> Result<String, FragmentError> {
    let path_str = path.to_string_lossy();
    let mut file = File::open(path).map_err(|e| io_error("hashfile", Some(&path_str), e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_len.max(1)];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| io_error("hashfile", Some(&path_str), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// [`hashfile`] for many files on the rayon pool, in input order.
pub fn hash_files(paths: Vec<PathBuf>) -> Vec<(PathBuf, Result<String, FragmentError>)> {
    parallel_map(paths, |path| {
        let digest = hashfile(&path, HASH_CHUNK_LEN);
        (path, digest)
    })
}

/// Drop characters that are forbidden or awkward in file names.
pub fn stringtovalidfilename(input: &str) -> String {
    input
        .chars()
        .filter(|c| !"<>&:\"\\/|?*%$".contains(*c))
        .collect()
}

/// Keep only `-`, `_`, `.`, ASCII letters and digits.
pub fn stringtovalidfilename2(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "-_.".contains(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int2bin() {
        assert_eq!(int2bin(5, 8), "00000101");
        assert_eq!(int2bin(5, 7), "0000101");
        assert_eq!(int2bin(5, 5), "00101");
        assert_eq!(int2bin(4478, 14), "01000101111110");
        assert_eq!(int2bin(4478, 13), "1000101111110");
        assert_eq!(int2bin(4478, 12), "1000101111110");
    }

    #[test]
    fn test_file_exists_current() {
        assert!(!file_exists_current(
            Path::new("/ThisFileWillNeverExist.SURE"),
            DEFAULT_MAX_AGE
        ));
        let td = tempfile::tempdir().expect("tmp");
        let path = td.path().join("fresh.txt");
        fs::write(&path, "x").expect("write");
        assert!(file_exists_current(&path, DEFAULT_MAX_AGE));
        assert!(!file_exists_current(&path, Duration::ZERO));
    }

    #[test]
    fn test_filecache_refreshes_only_when_stale() {
        let td = tempfile::tempdir().expect("tmp");
        let path = td.path().join("cache.txt");

        let first = filecache(
            &path,
            || Ok(io::Cursor::new(b"first".to_vec())),
            |p| fs::read_to_string(p).unwrap(),
            DEFAULT_MAX_AGE,
        )
        .unwrap();
        assert_eq!(first, "first");

        let second = filecache(
            &path,
            || Ok(io::Cursor::new(b"second".to_vec())),
            |p| fs::read_to_string(p).unwrap(),
            DEFAULT_MAX_AGE,
        )
        .unwrap();
        assert_eq!(second, "first");

        let stale = filecache(
            &path,
            || Ok(io::Cursor::new(b"third".to_vec())),
            |p| fs::read_to_string(p).unwrap(),
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(stale, "third");
    }

    #[test]
    fn test_filecache_refresh_error() {
        let td = tempfile::tempdir().expect("tmp");
        let path = td.path().join("never.txt");
        let res = filecache(
            &path,
            || Err::<io::Empty, _>(io::Error::new(io::ErrorKind::TimedOut, "offline")),
            |_| (),
            DEFAULT_MAX_AGE,
        );
        assert!(matches!(res, Err(FragmentError::Io { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_recurse_files_deepest_first() {
        let td = tempfile::tempdir().expect("tmp");
        let root = td.path();
        fs::create_dir_all(root.join("a").join("b")).expect("dirs");
        fs::write(root.join("top.txt"), "").expect("write");
        fs::write(root.join("a").join("mid.txt"), "").expect("write");
        fs::write(root.join("a").join("b").join("deep.txt"), "").expect("write");

        let files = recurse_files_in_folder(root);
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["deep.txt", "mid.txt", "top.txt"]);
    }

    #[test]
    fn test_basic_auth() {
        assert_eq!(
            basic_auth("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn test_hashfile() {
        let td = tempfile::tempdir().expect("tmp");
        let empty = td.path().join("empty");
        fs::write(&empty, "").expect("write");
        assert_eq!(
            hashfile(&empty, HASH_CHUNK_LEN).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let abc = td.path().join("abc");
        fs::write(&abc, "abc").expect("write");
        // tiny chunks exercise the read loop
        assert_eq!(
            hashfile(&abc, 1).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_files_keeps_order() {
        let td = tempfile::tempdir().expect("tmp");
        let a = td.path().join("a");
        let missing = td.path().join("missing");
        fs::write(&a, "abc").expect("write");

        let results = hash_files(vec![a.clone(), missing.clone()]);
        assert_eq!(results[0].0, a);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, missing);
        assert!(results[1].1.is_err());
    }

    #[test]
    fn test_stringtovalidfilename() {
        assert_eq!(
            stringtovalidfilename("a:/xäü\\?*1__x&%&$§§)§(§/$<>-_,.;:;:)"),
            "axäü1__x§§)§(§-_,.;;)"
        );
        assert_eq!(stringtovalidfilename2("a b/c-d_e.txt?"), "abc-d_e.txt");
    }

    #[test]
    fn test_thread_native_id_differs_across_threads() {
        let here = thread_native_id();
        let there = std::thread::spawn(thread_native_id).join().unwrap();
        assert_ne!(here, 0);
        if cfg!(unix) {
            assert_ne!(here, there);
        }
    }
}
