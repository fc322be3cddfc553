//! Naming scheme for captured photos: `photo_<N>.jpg`.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;

pub const PHOTO_PREFIX: &str = "photo_";
pub const PHOTO_EXTENSION: &str = ".jpg";

/// A photo persisted by a capture sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedPhoto {
    pub number: u64,
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
}

impl CapturedPhoto {
    pub fn new(dir: &Path, number: u64) -> Self {
        let file_name = photo_file_name(number);
        Self {
            number,
            path: dir.join(&file_name),
            file_name,
        }
    }
}

pub fn photo_file_name(number: u64) -> String {
    format!("{PHOTO_PREFIX}{number}{PHOTO_EXTENSION}")
}

/// Extract `N` from `photo_<N>.jpg`. Anything else, including temporary
/// `.part` files, yields `None`.
pub fn parse_photo_number(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(PHOTO_PREFIX)?
        .strip_suffix(PHOTO_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// All photo numbers found in `dir`, unordered.
pub fn scan_photo_numbers(dir: &Path) -> io::Result<Vec<u64>> {
    let mut numbers = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(number) = entry.file_name().to_str().and_then(parse_photo_number) {
            numbers.push(number);
        }
    }
    Ok(numbers)
}

/// Next number to hand out: one past the highest on disk, or 1. Fails with
/// `InvalidData` when the highest number leaves nothing to hand out.
pub fn next_photo_number(dir: &Path) -> io::Result<u64> {
    match scan_photo_numbers(dir)?.into_iter().max() {
        None => Ok(1),
        Some(highest) => highest.checked_add(1).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} exhausts photo numbering", photo_file_name(highest)),
            )
        }),
    }
}

/// Photo file names in `dir`, most recent capture first.
pub fn list_photo_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut numbers = scan_photo_numbers(dir)?;
    numbers.sort_unstable_by(|a, b| b.cmp(a));
    Ok(numbers.into_iter().map(photo_file_name).collect())
}
