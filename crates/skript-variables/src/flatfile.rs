//! CSV file storage.
//!
//! Every line is `name, type, HEXDATA`. Changes are appended; the file is
//! rewritten in full on [`VariableStorage::rewrite`]. A deleted variable is
//! written with the type `null`.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use skript_types::{SerializedValue, TypeRegistry, Value};
use tracing::{error, info};

use crate::error::{StorageError, StorageResult};
use crate::storage::VariableStorage;

const HEADER: [&str; 3] = [
    "# === Skript's variable storage ===",
    "# Please do not modify this file manually!",
    "#",
];

/// Variables in a CSV file.
#[derive(Debug)]
pub struct FlatFileStorage {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    loaded: AtomicBool,
    changes: AtomicUsize,
}

impl FlatFileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
            loaded: AtomicBool::new(false),
            changes: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Changes appended since the last rewrite.
    #[must_use]
    pub fn changes(&self) -> usize {
        self.changes.load(Ordering::Relaxed)
    }

    fn open_append(&self) -> StorageResult<BufWriter<File>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let empty = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if empty {
            write_header(&mut writer)?;
            writer.flush()?;
        }
        Ok(writer)
    }
}

impl VariableStorage for FlatFileStorage {
    fn load(&self, registry: &TypeRegistry, sink: &mut dyn FnMut(&str, Option<Value>)) -> StorageResult<()> {
        if self.path.is_dir() {
            return Err(StorageError::NotAFile(self.path.clone()));
        }

        let mut failed = Vec::new();
        if self.path.exists() {
            let reader = BufReader::new(File::open(&self.path)?);
            for (index, bytes) in reader.split(b'\n').enumerate() {
                // Undecodable bytes become U+FFFD instead of failing the file.
                let bytes = bytes?;
                let line = String::from_utf8_lossy(&bytes);
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let fields = split_csv(trimmed);
                let [name, type_code, data] = match fields.as_deref() {
                    Some([name, type_code, data]) => [name, type_code, data],
                    _ => {
                        error!(
                            "{}",
                            StorageError::InvalidLine {
                                line: index + 1,
                                content: line.to_string(),
                            }
                        );
                        let name = fields.as_ref().and_then(|f| f.first()).map_or("<unknown>", String::as_str);
                        failed.push(name.to_owned());
                        continue;
                    }
                };
                if type_code == "null" {
                    sink(name, None);
                    continue;
                }
                let value = decode_hex(data)
                    .ok()
                    .and_then(|bytes| registry.deserialize(type_code, &bytes));
                match value {
                    Some(value) => sink(name, Some(value)),
                    None => failed.push(name.clone()),
                }
            }
        }

        if !failed.is_empty() {
            error!(
                "{} variable{} could not be loaded!",
                failed.len(),
                if failed.len() == 1 { "" } else { "s" }
            );
            error!("Affected variables: {}", failed.join(", "));
            match backup_file(&self.path) {
                Ok(backup) => info!("Created a backup of {} as {}", self.path.display(), backup.display()),
                Err(e) => error!("Could not backup {}: {e}", self.path.display()),
            }
        }

        self.connect()?;
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    fn save(&self, name: &str, value: Option<&SerializedValue>) -> StorageResult<()> {
        // A rewrite drops deleted variables anyway.
        if value.is_none() && !self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| StorageError::Closed(self.path.display().to_string()))?;
        let line = match value {
            Some(value) => write_csv(&[name, value.type_code.as_str(), &encode_hex(&value.data)]),
            None => write_csv(&[name, "null", ""]),
        };
        writeln!(writer, "{line}")?;
        writer.flush()?;
        self.changes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rewrite(&self, variables: &[(String, SerializedValue)]) -> StorageResult<()> {
        let mut guard = self.writer.lock();
        if let Some(writer) = guard.as_mut() {
            writer.flush()?;
        }
        let was_connected = guard.take().is_some();

        let mut temp = self.path.clone().into_os_string();
        temp.push(".temp");
        let temp = PathBuf::from(temp);
        {
            let mut out = BufWriter::new(File::create(&temp)?);
            write_header(&mut out)?;
            for (name, value) in variables {
                let line = write_csv(&[name.as_str(), value.type_code.as_str(), &encode_hex(&value.data)]);
                writeln!(out, "{line}")?;
            }
            out.flush()?;
        }
        fs::rename(&temp, &self.path)?;
        self.changes.store(0, Ordering::Relaxed);

        if was_connected {
            *guard = Some(self.open_append()?);
        }
        Ok(())
    }

    fn connect(&self) -> StorageResult<()> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            *guard = Some(self.open_append()?);
        }
        Ok(())
    }

    fn disconnect(&self) -> StorageResult<()> {
        if let Some(mut writer) = self.writer.lock().take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn backup(&self) -> StorageResult<()> {
        let mut guard = self.writer.lock();
        if let Some(writer) = guard.as_mut() {
            writer.flush()?;
        }
        let backup = backup_file(&self.path)?;
        info!("Created a backup of {} as {}", self.path.display(), backup.display());
        Ok(())
    }

    fn file(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn write_header(out: &mut impl Write) -> StorageResult<()> {
    for line in HEADER {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "# version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out)?;
    Ok(())
}

/// Copy `path` to `backups/<stem>_<millis>.<ext>` next to it.
pub fn backup_file(path: &Path) -> StorageResult<PathBuf> {
    let dir = path.parent().unwrap_or_else(|| Path::new(".")).join("backups");
    fs::create_dir_all(&dir)?;
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis());
    let mut name = format!("{stem}_{millis}");
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    let backup = dir.join(name);
    if backup.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Backup file {} does already exist", backup.display()),
        )
        .into());
    }
    fs::copy(path, &backup)?;
    Ok(backup)
}

/// Uppercase hexadecimal.
#[must_use]
pub fn encode_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

pub fn decode_hex(hex: &str) -> StorageResult<Vec<u8>> {
    let invalid = || StorageError::InvalidHex(hex.to_owned());
    if !hex.len().is_multiple_of(2) {
        return Err(invalid());
    }
    let digits: Vec<u8> = hex
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()
        .ok_or_else(invalid)?;
    Ok(digits.chunks_exact(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

/// Join fields with `", "`. Fields containing `,` `"` `#` or whitespace are
/// quoted with `"` doubled.
#[must_use]
pub fn write_csv(fields: &[&str]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        if field.contains([',', '"', '#']) || field.contains(|c: char| c.is_ascii_whitespace()) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out
}

/// Split one CSV line. Unquoted fields are trimmed, quoted fields keep their
/// content with `""` unescaped. `None` if the line is malformed.
#[must_use]
pub fn split_csv(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        let mut field = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_whitespace) {
            field.push(c);
        }

        if chars.next_if_eq(&'"').is_some() {
            let mut quoted = String::new();
            loop {
                match chars.next()? {
                    '"' if chars.next_if_eq(&'"').is_some() => quoted.push('"'),
                    '"' => break,
                    c => quoted.push(c),
                }
            }
            while chars.next_if(char::is_ascii_whitespace).is_some() {}
            fields.push(quoted);
            match chars.next() {
                None => return Some(fields),
                Some(',') => continue,
                Some(_) => return None,
            }
        }

        loop {
            match chars.next() {
                None => {
                    fields.push(field.trim().to_owned());
                    return Some(fields);
                }
                Some(',') => break,
                Some('"') => return None,
                Some(c) => field.push(c),
            }
        }
        fields.push(field.trim().to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        let bytes = [0x80, 0xB0, 0xFF, 0x00, 0x01, 0x44, 0x7F];
        assert_eq!(encode_hex(&bytes), "80B0FF0001447F");
        assert_eq!(decode_hex("80B0FF0001447F").unwrap(), bytes);
        assert_eq!(decode_hex("80b0").unwrap(), [0x80, 0xB0]);
        assert!(decode_hex("ABC").is_err());
        assert!(decode_hex("ZZ").is_err());
    }

    #[test]
    fn test_split_csv() {
        let cases: &[(&str, &[&str])] = &[
            ("", &[""]),
            (",", &["", ""]),
            (",,", &["", "", ""]),
            ("a", &["a"]),
            ("a,", &["a", ""]),
            (",a", &["", "a"]),
            (",a,", &["", "a", ""]),
            (" , a , ", &["", "a", ""]),
            ("a,b,c", &["a", "b", "c"]),
            (" a , b , c ", &["a", "b", "c"]),
            ("\"\"", &[""]),
            ("\",\"", &[","]),
            ("\"\"\"\"", &["\""]),
            ("\" \"", &[" "]),
            ("a, \"\"\"\", b, \", c\", d", &["a", "\"", "b", ", c", "d"]),
            ("a, \"\"\", b, \", c", &["a", "\", b, ", "c"]),
            ("\"\t\0\"", &["\t\0"]),
        ];
        for (line, expected) in cases {
            let fields = split_csv(line).unwrap_or_else(|| panic!("{line:?} should split"));
            assert_eq!(fields, *expected, "{line:?}");
        }

        for invalid in ["a\"b", "\"unterminated", "\"a\" b"] {
            assert_eq!(split_csv(invalid), None, "{invalid:?}");
        }
    }

    #[test]
    fn test_write_csv() {
        assert_eq!(write_csv(&["a", "integer", "FF"]), "a, integer, FF");
        assert_eq!(write_csv(&["a b", "x,y", "q\"#"]), "\"a b\", \"x,y\", \"q\"\"#\"");
        for fields in [["a b", "x,y", "q\"#"], ["plain", "", "say \"hi\""]] {
            assert_eq!(split_csv(&write_csv(&fields)).unwrap(), fields);
        }
    }
}
