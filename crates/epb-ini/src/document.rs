//! Sectioned key/value document
//!
//! EddyPro project files (`.eddypro`) and static metadata files (`.metadata`)
//! share one INI dialect. [`ConfigDocument`] keeps sections and keys in file
//! order, so a document that is loaded and written back without patches
//! serializes to the same content.
//!
//! Output format:
//! - `[section]` header lines
//! - `key=value`, no spaces around `=`
//! - LF line endings
//! - a blank line after each section

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::IniError;

/// Ordered key/value pairs of one section
pub type Section = IndexMap<String, String>;

/// In-memory project or metadata file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    sections: IndexMap<String, Section>,
}

impl ConfigDocument {
    /// Create an empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text
    ///
    /// Accepts `key=value` and `key = value`, `;` and `#` comment lines, blank
    /// lines and a leading byte-order mark.
    ///
    /// # Errors
    /// Returns [`IniError::MalformedTemplate`] for keys outside a section,
    /// lines without `=`, empty keys, or repeated sections and keys.
    pub fn parse(text: &str) -> Result<Self, IniError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut doc = Self::new();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .ok_or_else(|| IniError::malformed(line_no, "unterminated section header"))?
                    .trim();
                if name.is_empty() {
                    return Err(IniError::malformed(line_no, "empty section name"));
                }
                if doc.sections.contains_key(name) {
                    return Err(IniError::malformed(
                        line_no,
                        format!("duplicate section '{name}'"),
                    ));
                }
                doc.sections.insert(name.to_string(), Section::new());
                current = Some(name.to_string());
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| IniError::malformed(line_no, format!("no '=' in line: {line}")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(IniError::malformed(line_no, "empty key"));
            }

            let section_name = current.as_deref().ok_or_else(|| {
                IniError::malformed(line_no, format!("key '{key}' outside any section"))
            })?;
            let section = doc.sections.entry(section_name.to_string()).or_default();
            if section.contains_key(key) {
                return Err(IniError::malformed(
                    line_no,
                    format!("duplicate key '{key}' in section '{section_name}'"),
                ));
            }
            section.insert(key.to_string(), value.trim().to_string());
        }

        Ok(doc)
    }

    /// Read and parse a file
    ///
    /// # Errors
    /// Returns [`IniError::TemplateNotFound`] if `path` does not exist, and
    /// parse or IO errors otherwise.
    pub fn load(path: &Path) -> Result<Self, IniError> {
        if !path.exists() {
            return Err(IniError::TemplateNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|e| IniError::io_error(path, e))?;
        let doc = Self::parse(&text)?;
        tracing::debug!("Read INI template from {}", path.display());
        Ok(doc)
    }

    /// Whether the section exists
    #[inline]
    #[must_use]
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Section by name
    #[inline]
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Insert an empty section if absent, returning it
    pub fn add_section(&mut self, name: impl Into<String>) -> &mut Section {
        self.sections.entry(name.into()).or_default()
    }

    /// Section names in file order
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Value of `section.key`
    #[inline]
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// Value of `section.key` parsed as an integer
    #[must_use]
    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.get(section, key).and_then(|v| v.trim().parse().ok())
    }

    /// Set `section.key`, keeping the key's position if it already exists
    ///
    /// # Errors
    /// Returns [`IniError::MissingSection`] if the section does not exist.
    pub fn set(
        &mut self,
        section: &str,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), IniError> {
        let target = self
            .sections
            .get_mut(section)
            .ok_or_else(|| IniError::missing_section(section, format!("cannot set '{key}'")))?;
        target.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Serialize to INI text
    #[must_use]
    pub fn to_ini_string(&self) -> String {
        let mut out = String::new();
        for (name, section) in &self.sections {
            out.push('[');
            out.push_str(name);
            out.push_str("]\n");
            for (key, value) in section {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    /// Write to `path`, creating parent directories
    ///
    /// # Errors
    /// Returns [`IniError::Io`] on filesystem failure.
    pub fn write(&self, path: &Path) -> Result<(), IniError> {
        write_text(path, &self.to_ini_string())?;
        tracing::debug!("Wrote INI file to {}", path.display());
        Ok(())
    }
}

impl FromStr for ConfigDocument {
    type Err = IniError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ini_string())
    }
}

/// Replace `path` with `text` through a sibling temp file and a rename
pub(crate) fn write_text(path: &Path, text: &str) -> Result<(), IniError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| IniError::io_error(parent, e))?;

    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".tmp_{}_{file_name}", std::process::id()));

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        Ok(())
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&temp_path);
        return Err(IniError::io_error(&temp_path, e));
    }
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        IniError::io_error(path, e)
    })
}

/// Render a path with forward slashes, as EddyPro expects on every platform
#[must_use]
pub fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
;EDDYPRO_PROCESSING
[FluxCorrection_SpectralAnalysis_General]
sa_mode=1

[Project]
project_title=
file_type = 0
# comment
proj_file=C:\\data\\a.metadata

";

    #[test]
    fn parse_trims_and_keeps_order() {
        let doc = ConfigDocument::parse(SAMPLE).unwrap();
        let names: Vec<&str> = doc.section_names().collect();
        assert_eq!(names, vec!["FluxCorrection_SpectralAnalysis_General", "Project"]);
        assert_eq!(doc.get("Project", "file_type"), Some("0"));
        assert_eq!(doc.get("Project", "project_title"), Some(""));
        assert_eq!(doc.get("Project", "missing"), None);
        assert_eq!(doc.get_int("Project", "file_type"), Some(0));
    }

    #[test]
    fn serialize_has_no_spaces_and_trailing_blank() {
        let doc = ConfigDocument::parse(SAMPLE).unwrap();
        assert_eq!(
            doc.to_ini_string(),
            "[FluxCorrection_SpectralAnalysis_General]\nsa_mode=1\n\n\
             [Project]\nproject_title=\nfile_type=0\nproj_file=C:\\data\\a.metadata\n\n"
        );
    }

    #[test]
    fn parse_strips_bom() {
        let doc = ConfigDocument::parse("\u{feff}[A]\nk=v\n").unwrap();
        assert_eq!(doc.get("A", "k"), Some("v"));
    }

    #[test]
    fn value_may_contain_equals() {
        let doc = ConfigDocument::parse("[A]\nexpr=a=b\n").unwrap();
        assert_eq!(doc.get("A", "expr"), Some("a=b"));
    }

    #[test]
    fn keys_are_case_sensitive() {
        let doc = ConfigDocument::parse("[A]\nKey=1\nkey=2\n").unwrap();
        assert_eq!(doc.get("A", "Key"), Some("1"));
        assert_eq!(doc.get("A", "key"), Some("2"));
    }

    #[test]
    fn rejects_key_outside_section() {
        let err = ConfigDocument::parse("k=v\n[A]\n").unwrap_err();
        assert!(matches!(err, IniError::MalformedTemplate { line: 1, .. }));
    }

    #[test]
    fn rejects_line_without_delimiter() {
        let err = ConfigDocument::parse("[A]\njunk\n").unwrap_err();
        assert!(matches!(err, IniError::MalformedTemplate { line: 2, .. }));
    }

    #[test]
    fn rejects_duplicate_section() {
        let err = ConfigDocument::parse("[A]\n[B]\n[A]\n").unwrap_err();
        assert!(matches!(err, IniError::MalformedTemplate { line: 3, .. }));
    }

    #[test]
    fn rejects_unterminated_header() {
        assert!(ConfigDocument::parse("[A\n").is_err());
    }

    #[test]
    fn set_requires_section() {
        let mut doc = ConfigDocument::parse("[A]\nk=v\n").unwrap();
        doc.set("A", "k", "w").unwrap();
        doc.set("A", "new", "x").unwrap();
        assert_eq!(doc.to_ini_string(), "[A]\nk=w\nnew=x\n\n");

        let err = doc.set("B", "k", "v").unwrap_err();
        assert!(matches!(err, IniError::MissingSection { ref section, .. } if section == "B"));
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigDocument::load(&dir.path().join("none.ini")).unwrap_err();
        assert!(matches!(err, IniError::TemplateNotFound(_)));
    }

    #[test]
    fn write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("p.eddypro");
        let doc = ConfigDocument::parse("[A]\nk=v\n").unwrap();
        doc.write(&path).unwrap();
        assert_eq!(ConfigDocument::load(&path).unwrap(), doc);
    }

    #[test]
    fn write_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.eddypro");
        fs::write(&path, "[Old]\nk=stale\n").unwrap();

        let doc = ConfigDocument::parse("[A]\nk=v\n").unwrap();
        doc.write(&path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), doc.to_ini_string());
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["p.eddypro".to_string()]);
    }

    #[test]
    fn forward_slashes() {
        assert_eq!(to_forward_slashes(Path::new("C:\\x\\y")), "C:/x/y");
        assert_eq!(to_forward_slashes(Path::new("/a/b")), "/a/b");
    }
}
