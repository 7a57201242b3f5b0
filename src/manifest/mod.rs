//! Filesystem manifests - the baseline for incremental layer generation.
//!
//! A manifest is a line-oriented snapshot of a rootfs: one entry per path,
//! recording type, ownership, mode, size, content hash, and link target.
//! The bundle keeps the manifest of the last generated layer; diffing the
//! live rootfs against it yields the change set the next layer encodes.

pub mod diff;
pub mod walk;

pub use walk::{walk_rootfs, FsEval};

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// File type of a manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl EntryKind {
    fn keyword(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
            EntryKind::Symlink => "link",
            EntryKind::CharDevice => "char",
            EntryKind::BlockDevice => "block",
            EntryKind::Fifo => "fifo",
            EntryKind::Socket => "socket",
        }
    }

    fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "file" => EntryKind::File,
            "dir" => EntryKind::Dir,
            "link" => EntryKind::Symlink,
            "char" => EntryKind::CharDevice,
            "block" => EntryKind::BlockDevice,
            "fifo" => EntryKind::Fifo,
            "socket" => EntryKind::Socket,
            _ => return None,
        })
    }
}

/// One recorded filesystem entry.
///
/// `size` and `sha256` are recorded for regular files only; `sha256` may
/// additionally be absent when a rootless walk could not read the file.
/// `link` is the symlink target, `device` the char/block major/minor pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub uid: u32,
    pub gid: u32,
    /// Permission bits only (0o7777 mask).
    pub mode: u32,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub link: Option<String>,
    pub device: Option<(u64, u64)>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Keyword-wise equality. Optional keywords are compared only when
    /// present on both sides.
    pub fn same_as(&self, other: &Entry) -> bool {
        if self.kind != other.kind
            || self.uid != other.uid
            || self.gid != other.gid
            || self.mode != other.mode
            || self.link != other.link
        {
            return false;
        }
        if let (Some(a), Some(b)) = (self.size, other.size) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.sha256, &other.sha256) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (self.device, other.device) {
            if a != b {
                return false;
            }
        }
        true
    }
}

/// A parsed or freshly-walked filesystem manifest.
///
/// Keys are rootfs-relative paths with `.` for the root itself; the map
/// order puts every directory before its contents.
#[derive(Debug, Default)]
pub struct Manifest {
    pub entries: BTreeMap<String, Entry>,
}

impl Manifest {
    /// Parse manifest text. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Manifest> {
        let mut entries = BTreeMap::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(first) = fields.next() else {
                continue;
            };
            let path = unescape(first)
                .with_context(|| format!("bad path on manifest line {}", lineno + 1))?;

            let mut kind = None;
            let mut entry = Entry {
                kind: EntryKind::File,
                uid: 0,
                gid: 0,
                mode: 0,
                size: None,
                sha256: None,
                link: None,
                device: None,
            };

            for field in fields {
                let Some((key, value)) = field.split_once('=') else {
                    bail!("malformed keyword '{}' on manifest line {}", field, lineno + 1);
                };
                match key {
                    "type" => {
                        kind = EntryKind::from_keyword(value);
                        if kind.is_none() {
                            bail!("unknown type '{}' on manifest line {}", value, lineno + 1);
                        }
                    }
                    "uid" => entry.uid = value.parse().context("bad uid")?,
                    "gid" => entry.gid = value.parse().context("bad gid")?,
                    "mode" => {
                        entry.mode = u32::from_str_radix(value, 8)
                            .with_context(|| format!("bad mode '{}'", value))?
                            & 0o7777;
                    }
                    "size" => entry.size = Some(value.parse().context("bad size")?),
                    "sha256" => entry.sha256 = Some(value.to_string()),
                    "link" => entry.link = Some(unescape(value)?),
                    "device" => {
                        let (maj, min) = value
                            .split_once(',')
                            .with_context(|| format!("bad device '{}'", value))?;
                        entry.device =
                            Some((maj.parse().context("bad major")?, min.parse().context("bad minor")?));
                    }
                    // Unknown keywords from a newer writer are ignored
                    _ => {}
                }
            }

            let Some(kind) = kind else {
                bail!("manifest line {} has no type keyword", lineno + 1);
            };
            entry.kind = kind;
            entries.insert(path, entry);
        }

        Ok(Manifest { entries })
    }

    /// Render as manifest text, parents before children.
    pub fn render(&self) -> String {
        let mut out = String::from("# strata filesystem manifest\n");

        for (path, entry) in &self.entries {
            let _ = write!(
                out,
                "{} type={} uid={} gid={} mode={:04o}",
                escape(path),
                entry.kind.keyword(),
                entry.uid,
                entry.gid,
                entry.mode,
            );
            if let Some(size) = entry.size {
                let _ = write!(out, " size={}", size);
            }
            if let Some(sha256) = &entry.sha256 {
                let _ = write!(out, " sha256={}", sha256);
            }
            if let Some(link) = &entry.link {
                let _ = write!(out, " link={}", escape(link));
            }
            if let Some((maj, min)) = entry.device {
                let _ = write!(out, " device={},{}", maj, min);
            }
            out.push('\n');
        }

        out
    }
}

/// Escape whitespace and backslashes so a path survives the line format.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\040"),
            '\t' => out.push_str("\\011"),
            '\n' => out.push_str("\\012"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some(d0) => {
                let (d1, d2) = (chars.next(), chars.next());
                let (Some(d1), Some(d2)) = (d1, d2) else {
                    bail!("truncated escape in '{}'", s);
                };
                let code = u32::from_str_radix(&format!("{}{}{}", d0, d1, d2), 8)
                    .with_context(|| format!("bad escape in '{}'", s))?;
                out.push(char::from_u32(code).with_context(|| format!("bad escape in '{}'", s))?);
            }
            None => bail!("trailing backslash in '{}'", s),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_entry(sha: &str, size: u64) -> Entry {
        Entry {
            kind: EntryKind::File,
            uid: 0,
            gid: 0,
            mode: 0o644,
            size: Some(size),
            sha256: Some(sha.to_string()),
            link: None,
            device: None,
        }
    }

    #[test]
    fn test_render_parse_round_trip() {
        let mut manifest = Manifest::default();
        manifest.entries.insert(
            ".".to_string(),
            Entry {
                kind: EntryKind::Dir,
                uid: 0,
                gid: 0,
                mode: 0o755,
                size: None,
                sha256: None,
                link: None,
                device: None,
            },
        );
        manifest.entries.insert("etc/hello".to_string(), file_entry("abc123", 3));
        manifest.entries.insert(
            "bin/sh".to_string(),
            Entry {
                kind: EntryKind::Symlink,
                uid: 0,
                gid: 0,
                mode: 0o777,
                size: None,
                sha256: None,
                link: Some("bash".to_string()),
                device: None,
            },
        );

        let parsed = Manifest::parse(&manifest.render()).unwrap();
        assert_eq!(parsed.entries, manifest.entries);
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = "# header\n\n. type=dir uid=0 gid=0 mode=0755\n";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert!(manifest.entries["."].is_dir());
    }

    #[test]
    fn test_parse_rejects_missing_type() {
        assert!(Manifest::parse("etc uid=0 gid=0 mode=0755\n").is_err());
    }

    #[test]
    fn test_escaped_path_round_trips() {
        let mut manifest = Manifest::default();
        manifest
            .entries
            .insert("etc/with space".to_string(), file_entry("ff", 1));

        let text = manifest.render();
        assert!(text.contains("etc/with\\040space"));
        let parsed = Manifest::parse(&text).unwrap();
        assert!(parsed.entries.contains_key("etc/with space"));
    }

    #[test]
    fn test_same_as_compares_optional_keywords_when_present() {
        let a = file_entry("abc", 3);
        let mut b = a.clone();
        assert!(a.same_as(&b));

        b.sha256 = None;
        // hash missing on one side is not a difference
        assert!(a.same_as(&b));

        b.sha256 = Some("def".to_string());
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_same_as_mode_and_ownership() {
        let a = file_entry("abc", 3);
        let mut b = a.clone();
        b.mode = 0o600;
        assert!(!a.same_as(&b));

        let mut c = a.clone();
        c.uid = 1000;
        assert!(!a.same_as(&c));
    }
}
