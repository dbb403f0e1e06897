use chrono::{DateTime, Utc};

/// Directory used for files without an extension.
const NO_EXTENSION_DIR: &str = "others";

/// Where an upload lands: `<ext>/<YYYY-MM-DD>/<unix-ts>-<name>`, relative to
/// the backend root or bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub path: String,
    pub filename: String,
}

impl Placement {
    pub fn new(original_name: &str, now: DateTime<Utc>) -> Self {
        let name = sanitize_filename(original_name);
        Self {
            path: format!(
                "{}/{}",
                extension_dir(&name),
                now.format("%Y-%m-%d")
            ),
            filename: format!("{}-{}", now.timestamp(), name),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.path, self.filename)
    }
}

/// The directory an extension groups into: the text after the final `.` of
/// the name, case preserved, or `others` when there is none.
pub fn extension_dir(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => NO_EXTENSION_DIR,
    }
}

/// Reduce a client-supplied name to its final path component.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => "file".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_extension_dir() {
        assert_eq!(extension_dir("report.pdf"), "pdf");
        assert_eq!(extension_dir("report.PDF"), "PDF");
        assert_eq!(extension_dir("archive.tar.gz"), "gz");
        assert_eq!(extension_dir("README"), "others");
        assert_eq!(extension_dir("trailing."), "others");
        assert_eq!(extension_dir(".bashrc"), "bashrc");
    }

    #[test]
    fn test_placement_layout() {
        let now = at_noon();
        let placement = Placement::new("photo.png", now);
        assert_eq!(placement.path, "png/2024-03-09");
        assert_eq!(placement.filename, format!("{}-photo.png", now.timestamp()));
        assert_eq!(
            placement.key(),
            format!("png/2024-03-09/{}-photo.png", now.timestamp())
        );
    }

    #[test]
    fn test_placement_strips_directories() {
        let now = at_noon();
        assert_eq!(
            Placement::new("../../etc/passwd", now).filename,
            format!("{}-passwd", now.timestamp())
        );
        assert_eq!(
            Placement::new("C:\\Users\\me\\notes.txt", now).path,
            "txt/2024-03-09"
        );
        assert_eq!(
            Placement::new("dir/", now).filename,
            format!("{}-file", now.timestamp())
        );
    }
}
