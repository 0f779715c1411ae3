//! Font discovery shared by the PDF composer and the raster text painter.
//!
//! Fonts are searched in `AUTOATLAS_FONTS_DIR`, then in `assets/fonts` next to
//! the running binary, then in `assets/fonts` of this crate.  When none of those
//! hold the Roboto family, a system family (DejaVu Sans or Arial) is tried.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use genpdf::fonts::{FontData, FontFamily};
use log::{debug, warn};

use crate::error::SetupError;

/// Environment variable overriding the font search path.
pub const FONTS_DIR_ENV: &str = "AUTOATLAS_FONTS_DIR";

/// Name of the bundled font family.
pub const DEFAULT_FONT_FAMILY_NAME: &str = "Roboto";

struct FamilyFiles {
    name: &'static str,
    regular: &'static str,
    bold: &'static str,
    italic: &'static str,
    bold_italic: &'static str,
}

impl FamilyFiles {
    fn all(&self) -> [&'static str; 4] {
        [self.regular, self.bold, self.italic, self.bold_italic]
    }
}

const BUNDLED: FamilyFiles = FamilyFiles {
    name: DEFAULT_FONT_FAMILY_NAME,
    regular: "Roboto-Regular.ttf",
    bold: "Roboto-Bold.ttf",
    italic: "Roboto-Italic.ttf",
    bold_italic: "Roboto-BoldItalic.ttf",
};

const SYSTEM_FAMILIES: &[(FamilyFiles, &[&str])] = &[
    (
        FamilyFiles {
            name: "DejaVu Sans",
            regular: "DejaVuSans.ttf",
            bold: "DejaVuSans-Bold.ttf",
            italic: "DejaVuSans-Oblique.ttf",
            bold_italic: "DejaVuSans-BoldOblique.ttf",
        },
        &[
            "/usr/share/fonts/truetype/dejavu",
            "/usr/share/fonts/dejavu",
            "/usr/share/fonts/TTF",
        ],
    ),
    (
        FamilyFiles {
            name: "Arial",
            regular: "arial.ttf",
            bold: "arialbd.ttf",
            italic: "ariali.ttf",
            bold_italic: "arialbi.ttf",
        },
        &["C:\\Windows\\Fonts", "/Library/Fonts"],
    ),
];

/// Raw TTF data of one four-style font family.
#[derive(Clone)]
pub struct FontSet {
    name: &'static str,
    directory: PathBuf,
    regular: Vec<u8>,
    bold: Vec<u8>,
    italic: Vec<u8>,
    bold_italic: Vec<u8>,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .finish()
    }
}

impl FontSet {
    /// Locates and reads the first complete font family.
    pub fn load() -> Result<Self, SetupError> {
        let mut attempts = Vec::new();

        for candidate in bundled_directory_candidates() {
            match missing_files(&candidate, &BUNDLED) {
                None => return Self::read(&candidate, &BUNDLED),
                Some(reason) => attempts.push(format!("{} ({})", candidate.display(), reason)),
            }
        }

        for (family, directories) in SYSTEM_FAMILIES {
            for directory in directories.iter().map(PathBuf::from) {
                if missing_files(&directory, family).is_none() {
                    warn!(
                        "Bundled fonts unavailable; falling back to system '{}' family in {}",
                        family.name,
                        directory.display()
                    );
                    return Self::read(&directory, family);
                }
            }
        }

        Err(SetupError::Fonts(format!(
            "no usable font family found. Checked: {}. \
             Set {} to a directory containing the Roboto TTF files",
            attempts.join(", "),
            FONTS_DIR_ENV
        )))
    }

    fn read(directory: &Path, family: &FamilyFiles) -> Result<Self, SetupError> {
        let read = |file: &str| {
            let path = directory.join(file);
            fs::read(&path).map_err(|source| SetupError::Resource {
                path: path.display().to_string(),
                source,
            })
        };
        debug!("Loading font family '{}' from {}", family.name, directory.display());

        Ok(Self {
            name: family.name,
            directory: directory.to_path_buf(),
            regular: read(family.regular)?,
            bold: read(family.bold)?,
            italic: read(family.italic)?,
            bold_italic: read(family.bold_italic)?,
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn regular(&self) -> &[u8] {
        &self.regular
    }

    pub fn bold(&self) -> &[u8] {
        &self.bold
    }

    /// Builds the `genpdf` font family for PDF documents.
    pub fn pdf_family(&self) -> Result<FontFamily<FontData>, SetupError> {
        let load = |bytes: &[u8], style: &str| {
            FontData::new(bytes.to_vec(), None).map_err(|err| {
                SetupError::Fonts(format!(
                    "failed to parse {} {} font from {}: {}",
                    self.name,
                    style,
                    self.directory.display(),
                    err
                ))
            })
        };

        Ok(FontFamily {
            regular: load(&self.regular, "regular")?,
            bold: load(&self.bold, "bold")?,
            italic: load(&self.italic, "italic")?,
            bold_italic: load(&self.bold_italic, "bold italic")?,
        })
    }
}

fn bundled_directory_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env::var_os(FONTS_DIR_ENV) {
        if !path.is_empty() {
            candidates.push(PathBuf::from(path));
        }
    }

    if let Ok(current_exe) = env::current_exe() {
        if let Some(bin_dir) = current_exe.parent() {
            let candidate = bin_dir.join("assets/fonts");
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }

    let manifest_candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts");
    if !candidates.contains(&manifest_candidate) {
        candidates.push(manifest_candidate);
    }

    candidates
}

fn missing_files(directory: &Path, family: &FamilyFiles) -> Option<String> {
    if !directory.is_dir() {
        return Some("directory missing".to_owned());
    }
    let missing: Vec<&str> = family
        .all()
        .into_iter()
        .filter(|file| !directory.join(file).is_file())
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(format!("missing files [{}]", missing.join(", ")))
    }
}

/// Indicates whether [`FontSet::load`] would find a complete family.
pub fn fonts_available() -> bool {
    bundled_directory_candidates()
        .iter()
        .any(|candidate| missing_files(candidate, &BUNDLED).is_none())
        || SYSTEM_FAMILIES.iter().any(|(family, directories)| {
            directories
                .iter()
                .any(|directory| missing_files(Path::new(directory), family).is_none())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_reported() {
        let reason = missing_files(Path::new("/definitely/not/here"), &BUNDLED);
        assert_eq!(reason.as_deref(), Some("directory missing"));
    }

    #[test]
    fn incomplete_family_lists_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Roboto-Regular.ttf"), b"stub").unwrap();

        let reason = missing_files(dir.path(), &BUNDLED).unwrap();
        assert!(reason.contains("Roboto-Bold.ttf"));
        assert!(!reason.contains("Roboto-Regular.ttf"));
    }

    #[test]
    fn availability_matches_loading() {
        assert_eq!(fonts_available(), FontSet::load().is_ok());
    }
}
