//! Preamble dialects: the header lines that precede a file's diff.
//!
//! Three dialects are recognised: Git (`diff --git …` plus its extras
//! lines), bare `diff` command lines, and RCS-style `Index:` headers. A
//! file may carry one preamble of each kind at once; the set resolves
//! the target path with the fixed precedence `Index → Git → Diff` and
//! the rename/copy source with `Git → Index → Diff`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::lines::line_content;
use crate::paths::{
    file_path_of_pair, strip_path, BeforeAfter, FilePathPlus, FileStatus,
};

static GIT_PREAMBLE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^diff\s+--git\s+(?:"(?P<qbefore>[^"]+)"|(?P<before>\S+))\s+(?:"(?P<qafter>[^"]+)"|(?P<after>\S+))$"#,
    )
    .unwrap()
});
static DIFF_PREAMBLE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^diff(?P<flags>\s.+)\s+(?:"(?P<qbefore>[^"]+)"|(?P<before>\S+))\s+(?:"(?P<qafter>[^"]+)"|(?P<after>\S+))$"#,
    )
    .unwrap()
});
static INDEX_PREAMBLE_CRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^Index:\s+(?:"(?P<qpath>[^"]+)"|(?P<path>\S+))(.*)$"#).unwrap()
});
static INDEX_SEP_CRE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^=+$").unwrap());

/// The recognised `extras` lines of a Git preamble, tried in order.
static GIT_EXTRAS_CRES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    let path = r#"("[^"]+"|\S+)"#;
    vec![
        ("old mode", Regex::new(r"^old mode\s+(\d*)$").unwrap()),
        ("new mode", Regex::new(r"^new mode\s+(\d*)$").unwrap()),
        (
            "deleted file mode",
            Regex::new(r"^deleted file mode\s+(\d*)$").unwrap(),
        ),
        (
            "new file mode",
            Regex::new(r"^new file mode\s+(\d*)$").unwrap(),
        ),
        (
            "copy from",
            Regex::new(&format!(r"^copy from\s+{path}$")).unwrap(),
        ),
        (
            "copy to",
            Regex::new(&format!(r"^copy to\s+{path}$")).unwrap(),
        ),
        (
            "rename from",
            Regex::new(&format!(r"^rename from\s+{path}$")).unwrap(),
        ),
        (
            "rename to",
            Regex::new(&format!(r"^rename to\s+{path}$")).unwrap(),
        ),
        (
            "similarity index",
            Regex::new(r"^similarity index\s+((\d*)%)$").unwrap(),
        ),
        (
            "dissimilarity index",
            Regex::new(r"^dissimilarity index\s+((\d*)%)$").unwrap(),
        ),
        (
            "index",
            Regex::new(r"^index\s+(([a-fA-F0-9]+)\.\.([a-fA-F0-9]+)( (\d*))?)$").unwrap(),
        ),
    ]
});

/// Strip surrounding quotes from a path token.
fn unquote(token: &str) -> String {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
        .to_string()
}

fn captured_pair(caps: &regex::Captures<'_>) -> BeforeAfter<String> {
    let before = caps
        .name("qbefore")
        .or_else(|| caps.name("before"))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let after = caps
        .name("qafter")
        .or_else(|| caps.name("after"))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    BeforeAfter::new(before, after)
}

/// Which dialect a preamble belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreambleKind {
    Git,
    Diff,
    Index,
}

/// Path lookup precedence.
const PATH_PRECEDENCE: [PreambleKind; 3] =
    [PreambleKind::Index, PreambleKind::Git, PreambleKind::Diff];
/// Rename/copy source lookup precedence.
const EXPATH_PRECEDENCE: [PreambleKind; 3] =
    [PreambleKind::Git, PreambleKind::Index, PreambleKind::Diff];

// ---------------------------------------------------------------------------
// Git preambles
// ---------------------------------------------------------------------------

/// A `diff --git` preamble with its extras lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitPreamble {
    pub lines: Vec<String>,
    pub file_data: BeforeAfter<String>,
    pub extras: HashMap<String, String>,
}

impl GitPreamble {
    pub fn get_preamble_at(lines: &[String], start: usize) -> Option<(GitPreamble, usize)> {
        let caps = GIT_PREAMBLE_CRE.captures(line_content(lines.get(start)?))?;
        let file_data = captured_pair(&caps);
        let mut extras = HashMap::new();
        let mut index = start + 1;
        'scan: while index < lines.len() {
            let content = line_content(&lines[index]);
            for (key, cre) in GIT_EXTRAS_CRES.iter() {
                if let Some(caps) = cre.captures(content) {
                    let value = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
                    extras.insert(key.to_string(), value);
                    index += 1;
                    continue 'scan;
                }
            }
            break;
        }
        Some((
            GitPreamble {
                lines: lines[start..index].to_vec(),
                file_data,
                extras,
            },
            index,
        ))
    }

    pub fn file_path(&self, strip_level: usize) -> Option<String> {
        file_path_of_pair(&self.file_data, strip_level)
    }

    /// Where the file's content came from, for renames and copies.
    pub fn expath(&self) -> Option<String> {
        ["copy from", "rename from"]
            .iter()
            .find_map(|key| self.extras.get(*key).map(|v| unquote(v)))
    }

    /// The file's mode after the change, when the extras declare one.
    pub fn new_mode(&self) -> Option<u32> {
        ["new mode", "new file mode"].iter().find_map(|key| {
            self.extras
                .get(*key)
                .and_then(|v| u32::from_str_radix(v, 8).ok())
        })
    }

    pub fn file_path_plus(&self, strip_level: usize) -> Option<FilePathPlus> {
        let mut fpp = FilePathPlus::from_pair(&self.file_data, strip_level)?;
        if self.extras.contains_key("new file mode") {
            fpp.status = FileStatus::Added;
        } else if self.extras.contains_key("deleted file mode") {
            fpp.status = FileStatus::Deleted;
        }
        fpp.expath = self.expath();
        Some(fpp)
    }
}

// ---------------------------------------------------------------------------
// Bare diff preambles
// ---------------------------------------------------------------------------

/// A bare `diff <flags> <path> <path>` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPreamble {
    pub lines: Vec<String>,
    pub file_data: BeforeAfter<String>,
}

impl DiffPreamble {
    pub fn get_preamble_at(lines: &[String], start: usize) -> Option<(DiffPreamble, usize)> {
        let caps = DIFF_PREAMBLE_CRE.captures(line_content(lines.get(start)?))?;
        // `diff --git` lines belong to the Git dialect even when it is
        // tried after this one.
        if caps
            .name("flags")
            .is_some_and(|flags| flags.as_str().contains("--git"))
        {
            return None;
        }
        Some((
            DiffPreamble {
                lines: lines[start..start + 1].to_vec(),
                file_data: captured_pair(&caps),
            },
            start + 1,
        ))
    }

    pub fn file_path(&self, strip_level: usize) -> Option<String> {
        file_path_of_pair(&self.file_data, strip_level)
    }

    pub fn file_path_plus(&self, strip_level: usize) -> Option<FilePathPlus> {
        FilePathPlus::from_pair(&self.file_data, strip_level)
    }
}

// ---------------------------------------------------------------------------
// Index preambles
// ---------------------------------------------------------------------------

/// An RCS-style `Index: <path>` header with its optional `===` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPreamble {
    pub lines: Vec<String>,
    pub file_path: String,
}

impl IndexPreamble {
    pub fn get_preamble_at(lines: &[String], start: usize) -> Option<(IndexPreamble, usize)> {
        let caps = INDEX_PREAMBLE_CRE.captures(line_content(lines.get(start)?))?;
        let file_path = caps
            .name("qpath")
            .or_else(|| caps.name("path"))?
            .as_str()
            .to_string();
        let mut index = start + 1;
        if index < lines.len() && INDEX_SEP_CRE.is_match(line_content(&lines[index])) {
            index += 1;
        }
        Some((
            IndexPreamble {
                lines: lines[start..index].to_vec(),
                file_path,
            },
            index,
        ))
    }

    pub fn file_path(&self, strip_level: usize) -> Option<String> {
        strip_path(&self.file_path, strip_level).ok()
    }

    pub fn file_path_plus(&self, strip_level: usize) -> Option<FilePathPlus> {
        Some(FilePathPlus {
            path: self.file_path(strip_level)?,
            status: FileStatus::Extant,
            expath: None,
        })
    }
}

// ---------------------------------------------------------------------------
// The preamble set
// ---------------------------------------------------------------------------

/// At most one preamble of each kind, remembering insertion order so a
/// parsed set re-serialises byte-identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreambleSet {
    git: Option<GitPreamble>,
    diff: Option<DiffPreamble>,
    index: Option<IndexPreamble>,
    order: Vec<PreambleKind>,
}

impl PreambleSet {
    /// Collect consecutive preambles starting at `lines[start]`.
    ///
    /// Kinds are tried in the order Git, Diff, Index; a kind already in
    /// the set is not retried, so a repeated kind ends the collection
    /// and starts the next file's preambles instead.
    pub fn get_preambles_at(lines: &[String], start: usize) -> (PreambleSet, usize) {
        let mut set = PreambleSet::default();
        let mut index = start;
        loop {
            if set.git.is_none() {
                if let Some((preamble, next)) = GitPreamble::get_preamble_at(lines, index) {
                    set.git = Some(preamble);
                    set.order.push(PreambleKind::Git);
                    index = next;
                    continue;
                }
            }
            if set.diff.is_none() {
                if let Some((preamble, next)) = DiffPreamble::get_preamble_at(lines, index) {
                    set.diff = Some(preamble);
                    set.order.push(PreambleKind::Diff);
                    index = next;
                    continue;
                }
            }
            if set.index.is_none() {
                if let Some((preamble, next)) = IndexPreamble::get_preamble_at(lines, index) {
                    set.index = Some(preamble);
                    set.order.push(PreambleKind::Index);
                    index = next;
                    continue;
                }
            }
            break;
        }
        (set, index)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn kinds(&self) -> &[PreambleKind] {
        &self.order
    }

    pub fn git(&self) -> Option<&GitPreamble> {
        self.git.as_ref()
    }

    pub fn diff(&self) -> Option<&DiffPreamble> {
        self.diff.as_ref()
    }

    pub fn index(&self) -> Option<&IndexPreamble> {
        self.index.as_ref()
    }

    pub fn has(&self, kind: PreambleKind) -> bool {
        match kind {
            PreambleKind::Git => self.git.is_some(),
            PreambleKind::Diff => self.diff.is_some(),
            PreambleKind::Index => self.index.is_some(),
        }
    }

    /// Every preamble's lines, in insertion order.
    pub fn append_lines_to(&self, out: &mut Vec<String>) {
        for kind in &self.order {
            match kind {
                PreambleKind::Git => out.extend_from_slice(&self.git.as_ref().unwrap().lines),
                PreambleKind::Diff => out.extend_from_slice(&self.diff.as_ref().unwrap().lines),
                PreambleKind::Index => out.extend_from_slice(&self.index.as_ref().unwrap().lines),
            }
        }
    }

    fn file_path_for(&self, kind: PreambleKind, strip_level: usize) -> Option<String> {
        match kind {
            PreambleKind::Git => self.git.as_ref().and_then(|p| p.file_path(strip_level)),
            PreambleKind::Diff => self.diff.as_ref().and_then(|p| p.file_path(strip_level)),
            PreambleKind::Index => self.index.as_ref().and_then(|p| p.file_path(strip_level)),
        }
    }

    /// The target path, by the fixed `Index → Git → Diff` precedence.
    pub fn file_path(&self, strip_level: usize) -> Option<String> {
        PATH_PRECEDENCE
            .iter()
            .find_map(|&kind| self.file_path_for(kind, strip_level))
    }

    /// The rename/copy source path, by the `Git → Index → Diff`
    /// precedence; only Git preambles can carry one.
    pub fn file_expath(&self) -> Option<String> {
        EXPATH_PRECEDENCE.iter().find_map(|&kind| match kind {
            PreambleKind::Git => self.git.as_ref().and_then(|p| p.expath()),
            _ => None,
        })
    }

    pub fn file_path_plus(&self, strip_level: usize) -> Option<FilePathPlus> {
        PATH_PRECEDENCE.iter().find_map(|&kind| match kind {
            PreambleKind::Git => self.git.as_ref().and_then(|p| p.file_path_plus(strip_level)),
            PreambleKind::Diff => self
                .diff
                .as_ref()
                .and_then(|p| p.file_path_plus(strip_level)),
            PreambleKind::Index => self
                .index
                .as_ref()
                .and_then(|p| p.file_path_plus(strip_level)),
        })
    }
}
