//! Day-partitioned todo list engine.
//!
//! A todo document is plain text: `YYYY-MM-DD` header lines open date sections, and task lines
//! (`- [ ] text`, `- [/] text`, `- [x] text`) nest by indentation under them. Nothing here keeps
//! a persistent tree; every operation re-derives structure from the lines it is given and hands
//! back new lines, so the caller owns reading and writing the document.

pub mod core {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /* ------------------------------- Status ------------------------------- */

    /// Recognized task markers: `[ ]`, `[/]` and `[x]`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TaskStatus {
        Todo,
        InProgress,
        Done,
    }

    impl TaskStatus {
        pub fn from_marker(marker: char) -> Option<Self> {
            match marker {
                ' ' => Some(Self::Todo),
                '/' => Some(Self::InProgress),
                'x' => Some(Self::Done),
                _ => None,
            }
        }

        pub fn marker(self) -> char {
            match self {
                Self::Todo => ' ',
                Self::InProgress => '/',
                Self::Done => 'x',
            }
        }

        /// Toggle cycle: Todo -> InProgress -> Done -> Todo.
        pub fn next(self) -> Self {
            match self {
                Self::Todo => Self::InProgress,
                Self::InProgress => Self::Done,
                Self::Done => Self::Todo,
            }
        }

        pub fn is_unfinished(self) -> bool {
            !matches!(self, Self::Done)
        }

        pub fn label(self) -> &'static str {
            match self {
                Self::Todo => "todo",
                Self::InProgress => "in progress",
                Self::Done => "done",
            }
        }
    }

    /* ---------------------------- Line classes ---------------------------- */

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LineKind {
        DateHeader,
        Task,
        Blank,
        Other,
    }

    /// A task line split into its parts, borrowed from the source line.
    ///
    /// `marker` is whatever single character sat between the brackets; it is only a
    /// [`TaskStatus`] when it is one of the three recognized markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskLine<'a> {
        pub indent: &'a str,
        pub marker: char,
        pub content: &'a str,
        /// Byte offset of the marker inside the line.
        pub marker_at: usize,
    }

    impl TaskLine<'_> {
        pub fn status(&self) -> Option<TaskStatus> {
            TaskStatus::from_marker(self.marker)
        }

        pub fn is_unfinished(&self) -> bool {
            self.status().is_some_and(TaskStatus::is_unfinished)
        }

        pub fn is_done(&self) -> bool {
            self.status() == Some(TaskStatus::Done)
        }

        /// Depth is the byte length of the indent; tabs and spaces count alike.
        pub fn depth(&self) -> usize {
            self.indent.len()
        }
    }

    /* ------------------------------ Sections ------------------------------ */

    /// Lines `header..end` of the document: a date header and everything up to the next one.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct DateSection {
        pub date: String,
        pub header: usize,
        pub end: usize,
    }

    impl DateSection {
        /// Line indices after the header line.
        pub fn body(&self) -> std::ops::Range<usize> {
            self.header + 1..self.end
        }
    }

    /// A parsed task inside a [`DateSection`], stored in an arena (`SectionTree::nodes`).
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct TaskNode {
        /// 0-based line index in the document.
        pub line: usize,
        pub depth: usize,
        pub marker: char,
        pub content: String,
        /// Arena index of the nearest enclosing task.
        pub parent: Option<usize>,
        pub children: Vec<usize>,
        /// No deeper task line immediately follows this one.
        pub leaf: bool,
    }

    impl TaskNode {
        pub fn status(&self) -> Option<TaskStatus> {
            TaskStatus::from_marker(self.marker)
        }

        pub fn is_unfinished(&self) -> bool {
            self.status().is_some_and(TaskStatus::is_unfinished)
        }
    }

    /// Where the locator starts looking for an earlier date section.
    ///
    /// The scan always runs forward. `Line(n)` ignores everything above line `n` (0-based), so
    /// only sections whose header sits at or below it are candidates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum ScanOrigin {
        #[default]
        DocumentStart,
        Line(usize),
    }

    impl ScanOrigin {
        pub fn start(self) -> usize {
            match self {
                Self::DocumentStart => 0,
                Self::Line(line) => line,
            }
        }
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("line {line} is out of range (document has {len} lines)")]
        LineOutOfRange { line: usize, len: usize },
        #[error("line {line} is not a task line")]
        NotATask { line: usize },
        #[error("reading {path:?}")]
        Read {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("writing {path:?}")]
        Write {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("parsing config {path:?}")]
        Config {
            path: PathBuf,
            source: toml::de::Error,
        },
    }

    pub type Result<T, E = Error> = std::result::Result<T, E>;
}

pub mod document {
    //! Line classification for todo documents.
    //!
    //! Classifiers are permissive: anything that does not match falls through as
    //! [`LineKind::Other`] and is carried verbatim by every transformation.

    use crate::core::{LineKind, TaskLine};
    use nom::{
        IResult,
        bytes::complete::{take_while, take_while_m_n},
        character::complete::{anychar, char, space0},
        combinator::recognize,
        sequence::tuple,
    };

    type PResult<'a, T> = IResult<&'a str, T>;

    /// Split document text into lines. A trailing newline yields a trailing empty line so
    /// that [`join_lines`] restores the text exactly.
    pub fn split_lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_string).collect()
    }

    pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
        lines
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join("\n")
    }

    fn year(i: &str) -> PResult<'_, &str> {
        take_while_m_n(4, 4, |c: char| c.is_ascii_digit())(i)
    }

    fn two_digits(i: &str) -> PResult<'_, &str> {
        take_while_m_n(2, 2, |c: char| c.is_ascii_digit())(i)
    }

    fn date_prefix(i: &str) -> PResult<'_, &str> {
        recognize(tuple((year, char('-'), two_digits, char('-'), two_digits)))(i)
    }

    fn is_indent_char(c: char) -> bool {
        c == ' ' || c == '\t'
    }

    /// `<indent>-<ws>[` up to and including the opening bracket; yields the indent.
    fn task_head(i: &str) -> PResult<'_, &str> {
        let (i, indent) = take_while(is_indent_char)(i)?;
        let (i, _) = char('-')(i)?;
        let (i, _) = space0(i)?;
        let (i, _) = char('[')(i)?;
        Ok((i, indent))
    }

    /// `<marker>]<ws>`; the remaining input is the content.
    fn task_tail(i: &str) -> PResult<'_, char> {
        let (i, marker) = anychar(i)?;
        let (i, _) = char(']')(i)?;
        let (i, _) = space0(i)?;
        Ok((i, marker))
    }

    /// The `YYYY-MM-DD` prefix of a date header line.
    pub fn date_header(line: &str) -> Option<&str> {
        date_prefix(line).ok().map(|(_, date)| date)
    }

    /// The `YYYY-MM` prefix of a date header line.
    pub fn month_key(line: &str) -> Option<&str> {
        date_header(line).map(|date| &date[..7])
    }

    /// Matches a task line with any single-character marker.
    pub fn task_line(line: &str) -> Option<TaskLine<'_>> {
        let (after_open, indent) = task_head(line).ok()?;
        let marker_at = line.len() - after_open.len();
        let (content, marker) = task_tail(after_open).ok()?;
        Some(TaskLine {
            indent,
            marker,
            content,
            marker_at,
        })
    }

    /// Task line whose marker is `[ ]` or `[/]`.
    pub fn is_unfinished_task_line(line: &str) -> bool {
        task_line(line).is_some_and(|task| task.is_unfinished())
    }

    pub fn is_blank(line: &str) -> bool {
        line.trim().is_empty()
    }

    pub fn classify(line: &str) -> LineKind {
        if date_header(line).is_some() {
            LineKind::DateHeader
        } else if task_line(line).is_some() {
            LineKind::Task
        } else if is_blank(line) {
            LineKind::Blank
        } else {
            LineKind::Other
        }
    }

    /// Rewrite only the marker character, leaving every other byte of the line alone.
    pub fn with_marker(line: &str, marker: char) -> Option<String> {
        let task = task_line(line)?;
        let after = task.marker_at + task.marker.len_utf8();
        let mut out = String::with_capacity(line.len());
        out.push_str(&line[..task.marker_at]);
        out.push(marker);
        out.push_str(&line[after..]);
        Some(out)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::TaskStatus;

        #[test]
        fn date_header_takes_ten_character_prefix() {
            assert_eq!(date_header("2024-01-02 Tue"), Some("2024-01-02"));
            assert_eq!(date_header("2024-01-02"), Some("2024-01-02"));
            assert_eq!(month_key("2024-01-02 Tue"), Some("2024-01"));
            assert_eq!(date_header("2024-1-02"), None);
            assert_eq!(date_header(" 2024-01-02"), None);
            assert_eq!(date_header("- [ ] 2024-01-02"), None);
        }

        #[test]
        fn task_line_parts() {
            let task = task_line("\t  - [/] write report").expect("task");
            assert_eq!(task.indent, "\t  ");
            assert_eq!(task.depth(), 3);
            assert_eq!(task.status(), Some(TaskStatus::InProgress));
            assert_eq!(task.content, "write report");

            let loose = task_line("-[x]done").expect("loose task");
            assert_eq!(loose.status(), Some(TaskStatus::Done));
            assert_eq!(loose.content, "done");

            let empty = task_line("- [ ]").expect("empty content");
            assert_eq!(empty.content, "");

            assert!(task_line("* [ ] star bullet").is_none());
            assert!(task_line("- [] missing marker").is_none());
            assert!(task_line("- plain bullet").is_none());
        }

        #[test]
        fn unknown_marker_is_a_task_but_never_unfinished() {
            let line = "- [?] mystery";
            let task = task_line(line).expect("generic match");
            assert_eq!(task.marker, '?');
            assert_eq!(task.status(), None);
            assert!(!is_unfinished_task_line(line));
            assert!(is_unfinished_task_line("  - [ ] open"));
            assert!(is_unfinished_task_line("- [/] started"));
            assert!(!is_unfinished_task_line("- [x] closed"));
        }

        #[test]
        fn classify_lines() {
            assert_eq!(classify("2024-03-01 Fri"), LineKind::DateHeader);
            assert_eq!(classify("    - [ ] a"), LineKind::Task);
            assert_eq!(classify(" \t "), LineKind::Blank);
            assert_eq!(classify("# notes"), LineKind::Other);
        }

        #[test]
        fn with_marker_keeps_surrounding_bytes() {
            assert_eq!(
                with_marker("\t-  [x]   spaced out", ' ').as_deref(),
                Some("\t-  [ ]   spaced out")
            );
            assert_eq!(with_marker("not a task", 'x'), None);
        }

        #[test]
        fn split_and_join_restore_text() {
            let text = "2024-01-01\n- [ ] a\n\n";
            let lines = split_lines(text);
            assert_eq!(lines, vec!["2024-01-01", "- [ ] a", "", ""]);
            assert_eq!(join_lines(&lines), text);
        }
    }
}

pub mod tree {
    //! Task hierarchy reconstruction within date sections.
    //!
    //! Parentage is purely a function of indent length: a task's parent is the nearest earlier
    //! task line in the same section with a strictly shorter indent. Blank and other lines are
    //! transparent.

    use crate::core::{DateSection, TaskNode};
    use crate::document::{date_header, task_line};

    /// All date sections in document order. Lines above the first header belong to none.
    pub fn sections<S: AsRef<str>>(lines: &[S]) -> Vec<DateSection> {
        let mut out: Vec<DateSection> = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            if let Some(date) = date_header(line.as_ref()) {
                if let Some(prev) = out.last_mut() {
                    prev.end = idx;
                }
                out.push(DateSection {
                    date: date.to_string(),
                    header: idx,
                    end: lines.len(),
                });
            }
        }
        out
    }

    /// A task is a leaf unless the very next line is a deeper task line.
    pub fn is_leaf<S: AsRef<str>>(lines: &[S], index: usize) -> bool {
        let Some(task) = lines.get(index).and_then(|l| task_line(l.as_ref())) else {
            return false;
        };
        match lines.get(index + 1).and_then(|l| task_line(l.as_ref())) {
            Some(next) => next.depth() <= task.depth(),
            None => true,
        }
    }

    /// Arena of the tasks in one section.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SectionTree {
        pub section: DateSection,
        pub nodes: Vec<TaskNode>,
    }

    impl SectionTree {
        /// Arena indices of the enclosing tasks, nearest parent first.
        pub fn ancestors(&self, node: usize) -> Vec<usize> {
            let mut out = Vec::new();
            let mut cursor = self.nodes[node].parent;
            while let Some(idx) = cursor {
                out.push(idx);
                cursor = self.nodes[idx].parent;
            }
            out
        }

        pub fn unfinished_leaves(&self) -> impl Iterator<Item = usize> + '_ {
            self.nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.leaf && n.is_unfinished())
                .map(|(idx, _)| idx)
        }

        pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
            self.nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.parent.is_none())
                .map(|(idx, _)| idx)
        }
    }

    pub fn parse_section<S: AsRef<str>>(lines: &[S], section: &DateSection) -> SectionTree {
        let mut nodes: Vec<TaskNode> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();

        for idx in section.body() {
            let Some(task) = task_line(lines[idx].as_ref()) else {
                continue;
            };
            let depth = task.depth();
            while let Some(&top) = stack.last() {
                if nodes[top].depth >= depth {
                    stack.pop();
                } else {
                    break;
                }
            }
            let parent = stack.last().copied();
            let node = nodes.len();
            nodes.push(TaskNode {
                line: idx,
                depth,
                marker: task.marker,
                content: task.content.to_string(),
                parent,
                children: Vec::new(),
                leaf: is_leaf(lines, idx),
            });
            if let Some(p) = parent {
                nodes[p].children.push(node);
            }
            stack.push(node);
        }

        SectionTree {
            section: section.clone(),
            nodes,
        }
    }

}

pub mod locator {
    //! Finds the nearest earlier date section that still has unfinished leaf tasks.

    use crate::core::ScanOrigin;
    use crate::tree::{parse_section, sections};
    use serde::Serialize;
    use std::collections::BTreeSet;
    use tracing::{debug, info};

    /// Lines harvested from one source section, ancestors ahead of their descendants.
    #[serde_with::skip_serializing_none]
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
    pub struct Harvest {
        pub source_date: Option<String>,
        /// Literal text of each collected line.
        pub lines: Vec<String>,
        /// 1-based line numbers matching `lines`.
        pub line_numbers: Vec<usize>,
    }

    impl Harvest {
        pub fn is_empty(&self) -> bool {
            self.lines.is_empty()
        }

        /// 0-based indices of the collected lines.
        pub fn indices(&self) -> Vec<usize> {
            self.line_numbers.iter().map(|n| n - 1).collect()
        }
    }

    /// Harvest the unfinished leaves of the first non-today section at or after `origin`,
    /// each preceded by its ancestor chain (any status). Shared ancestors appear once.
    pub fn locate<S: AsRef<str>>(lines: &[S], today: &str, origin: ScanOrigin) -> Harvest {
        let start = origin.start();
        for section in sections(lines).into_iter().filter(|s| s.header >= start) {
            if section.date == today {
                debug!(date = %section.date, "skipping today's section");
                continue;
            }
            let tree = parse_section(lines, &section);
            let leaves: Vec<usize> = tree.unfinished_leaves().collect();
            if leaves.is_empty() {
                debug!(date = %section.date, "no unfinished leaves");
                continue;
            }

            let mut harvest = Harvest {
                source_date: Some(section.date.clone()),
                ..Harvest::default()
            };
            let mut taken = BTreeSet::new();
            for leaf in leaves {
                let mut chain = tree.ancestors(leaf);
                chain.reverse();
                chain.push(leaf);
                for node in chain {
                    let line = tree.nodes[node].line;
                    if taken.insert(line) {
                        harvest.lines.push(lines[line].as_ref().to_string());
                        harvest.line_numbers.push(line + 1);
                    }
                }
            }
            info!(
                source_date = %section.date,
                lines = harvest.lines.len(),
                "found unfinished tasks"
            );
            return harvest;
        }
        Harvest::default()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn lines(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }

        #[test]
        fn harvests_leaves_with_ancestors_once() {
            let doc = lines(&[
                "2024-01-01",
                "- [x] Project",
                "\t- [ ] step one",
                "\t- [/] step two",
                "\t- [x] step three",
                "- [ ] Errand",
                "2023-12-31",
                "- [ ] older",
            ]);
            let harvest = locate(&doc, "2024-01-02", ScanOrigin::DocumentStart);
            assert_eq!(harvest.source_date.as_deref(), Some("2024-01-01"));
            assert_eq!(
                harvest.lines,
                vec![
                    "- [x] Project",
                    "\t- [ ] step one",
                    "\t- [/] step two",
                    "- [ ] Errand"
                ]
            );
            assert_eq!(harvest.line_numbers, vec![2, 3, 4, 6]);
            assert_eq!(harvest.indices(), vec![1, 2, 3, 5]);
        }

        #[test]
        fn unfinished_parent_with_children_is_not_a_leaf() {
            let doc = lines(&["2024-01-01", "- [ ] A", "\t- [x] B"]);
            let harvest = locate(&doc, "2024-01-05", ScanOrigin::DocumentStart);
            assert!(harvest.is_empty());
            assert_eq!(harvest.source_date, None);
        }

        #[test]
        fn today_is_never_the_source() {
            let doc = lines(&[
                "2024-01-02",
                "- [ ] already today",
                "2024-01-01",
                "- [ ] yesterday",
            ]);
            let harvest = locate(&doc, "2024-01-02", ScanOrigin::DocumentStart);
            assert_eq!(harvest.source_date.as_deref(), Some("2024-01-01"));
            assert_eq!(harvest.lines, vec!["- [ ] yesterday"]);
            assert_eq!(harvest.line_numbers, vec![4]);
        }

        #[test]
        fn skips_sections_without_unfinished_leaves() {
            let doc = lines(&[
                "2024-01-03",
                "- [x] done",
                "2024-01-02",
                "- [ ] left over",
                "2024-01-01",
                "- [ ] older",
            ]);
            let harvest = locate(&doc, "2024-01-04", ScanOrigin::DocumentStart);
            assert_eq!(harvest.source_date.as_deref(), Some("2024-01-02"));
            assert_eq!(harvest.lines, vec!["- [ ] left over"]);
        }

        #[test]
        fn line_origin_ignores_sections_above() {
            let doc = lines(&[
                "2024-01-03",
                "- [ ] newer",
                "2024-01-02",
                "- [ ] older",
            ]);
            let harvest = locate(&doc, "2024-01-04", ScanOrigin::Line(1));
            assert_eq!(harvest.source_date.as_deref(), Some("2024-01-02"));
            assert_eq!(harvest.lines, vec!["- [ ] older"]);
        }

        #[test]
        fn tasks_before_any_header_are_ignored() {
            let doc = lines(&["- [ ] floating", "notes"]);
            assert!(locate(&doc, "2024-01-01", ScanOrigin::DocumentStart).is_empty());
        }
    }
}

pub mod migrator {
    //! Merges migrated task lines into the target date's block.

    use crate::document::{date_header, is_blank, task_line, with_marker};
    use indexmap::IndexMap;
    use tracing::debug;

    /// Identity of a task across merge inputs: (indent, content), status ignored.
    pub type MergeKey = (String, String);

    #[derive(Debug)]
    struct MergeEntry {
        line: String,
        depth: usize,
        parent: Option<usize>,
        children: Vec<usize>,
    }

    /// Reset a task line's marker to `[ ]`; other lines pass through.
    pub fn reset_status(line: &str) -> String {
        with_marker(line, ' ').unwrap_or_else(|| line.to_string())
    }

    /// Merge `incoming` task lines into `existing` ones.
    ///
    /// The first occurrence of a [`MergeKey`] wins, status included, and keeps its position. A
    /// repeated key still becomes the current parent for the lines that follow it, so incoming
    /// children land under the existing node. Output is the depth-first walk of the merged tree.
    pub fn merge<S: AsRef<str>, T: AsRef<str>>(existing: &[S], incoming: &[T]) -> Vec<String> {
        let mut map: IndexMap<MergeKey, MergeEntry> = IndexMap::new();
        absorb(&mut map, existing.iter().map(AsRef::as_ref));
        absorb(&mut map, incoming.iter().map(AsRef::as_ref));

        let mut out = Vec::with_capacity(map.len());
        for idx in 0..map.len() {
            if map[idx].parent.is_none() {
                emit(&map, idx, &mut out);
            }
        }
        out
    }

    fn absorb<'a>(map: &mut IndexMap<MergeKey, MergeEntry>, tasks: impl Iterator<Item = &'a str>) {
        let mut stack: Vec<usize> = Vec::new();
        for raw in tasks {
            let Some(task) = task_line(raw) else {
                continue;
            };
            let depth = task.depth();
            while let Some(&top) = stack.last() {
                if map[top].depth >= depth {
                    stack.pop();
                } else {
                    break;
                }
            }
            let key = (task.indent.to_string(), task.content.to_string());
            let idx = match map.get_index_of(&key) {
                Some(idx) => {
                    debug!(content = task.content, "merged duplicate task");
                    idx
                }
                None => {
                    let parent = stack.last().copied();
                    let (idx, _) = map.insert_full(
                        key,
                        MergeEntry {
                            line: raw.to_string(),
                            depth,
                            parent,
                            children: Vec::new(),
                        },
                    );
                    if let Some(p) = parent {
                        map[p].children.push(idx);
                    }
                    idx
                }
            };
            stack.push(idx);
        }
    }

    fn emit(map: &IndexMap<MergeKey, MergeEntry>, idx: usize, out: &mut Vec<String>) {
        out.push(map[idx].line.clone());
        for &child in &map[idx].children {
            emit(map, child, out);
        }
    }

    /// End (exclusive) of the block under the header at `header`: the first blank line,
    /// date header, or end of document.
    pub fn block_end<S: AsRef<str>>(lines: &[S], header: usize) -> usize {
        lines
            .iter()
            .enumerate()
            .skip(header + 1)
            .find(|(_, l)| is_blank(l.as_ref()) || date_header(l.as_ref()).is_some())
            .map(|(idx, _)| idx)
            .unwrap_or(lines.len())
    }

    /// Put `incoming` under today's header.
    ///
    /// When today's header exists, its block is replaced by the merge of its task lines with
    /// `incoming`; non-task lines of the block follow the merged tasks. Otherwise `new_header`
    /// and `incoming` are inserted at `insert_at`. Either way the block gets a blank line on
    /// each side that touches non-blank content.
    pub fn place<S: AsRef<str>>(
        lines: &[S],
        today: &str,
        incoming: &[String],
        insert_at: usize,
        new_header: &str,
    ) -> Vec<String> {
        let mut out: Vec<String> = lines.iter().map(|l| l.as_ref().to_string()).collect();

        match out.iter().position(|l| date_header(l) == Some(today)) {
            Some(header) => {
                let end = block_end(&out, header);
                let (existing, other): (Vec<String>, Vec<String>) = out[header + 1..end]
                    .iter()
                    .cloned()
                    .partition(|l| task_line(l).is_some());
                let mut block = merge(&existing, incoming);
                block.extend(other);
                let after = header + 1 + block.len();
                debug!(header, existing = existing.len(), merged = block.len(), "merging into today");
                out.splice(header + 1..end, block);

                if after < out.len() && !is_blank(&out[after]) {
                    out.insert(after, String::new());
                }
                if header > 0 && !is_blank(&out[header - 1]) {
                    out.insert(header, String::new());
                }
            }
            None => {
                let at = insert_at.min(out.len());
                let mut block = Vec::with_capacity(incoming.len() + 3);
                if at > 0 && !is_blank(&out[at - 1]) {
                    block.push(String::new());
                }
                block.push(new_header.to_string());
                block.extend(incoming.iter().cloned());
                if at < out.len() && !is_blank(&out[at]) {
                    block.push(String::new());
                }
                debug!(at, "creating today's section");
                out.splice(at..at, block);
            }
        }
        out
    }

}

pub mod pruner {
    //! Removes migrated lines from their source section and repairs the parents left behind.

    use crate::core::TaskStatus;
    use crate::document::{date_header, task_line, with_marker};
    use tracing::debug;

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Pruned {
        pub lines: Vec<String>,
        /// Original 0-based indices that were deleted, ascending.
        pub removed: Vec<usize>,
        /// Original 0-based indices whose marker was set to `[x]`, ascending.
        pub completed: Vec<usize>,
    }

    /// Slots keep original indices stable; `None` marks a deleted line.
    struct Slots {
        lines: Vec<Option<String>>,
        completed: Vec<usize>,
    }

    impl Slots {
        fn depth(&self, idx: usize) -> Option<usize> {
            self.lines[idx]
                .as_deref()
                .and_then(task_line)
                .map(|t| t.depth())
        }

        /// Live task lines nested under `idx`, up to the first task at the same or a shallower
        /// depth or the next date header.
        fn descendants(&self, idx: usize) -> Vec<usize> {
            let Some(depth) = self.depth(idx) else {
                return Vec::new();
            };
            let mut out = Vec::new();
            for j in idx + 1..self.lines.len() {
                let Some(line) = self.lines[j].as_deref() else {
                    continue;
                };
                if date_header(line).is_some() {
                    break;
                }
                let Some(task) = task_line(line) else {
                    continue;
                };
                if task.depth() <= depth {
                    break;
                }
                out.push(j);
            }
            out
        }

        /// Nearest live task above `idx` with a shorter indent than `depth`, within the section.
        fn parent(&self, idx: usize, depth: usize) -> Option<usize> {
            for j in (0..idx).rev() {
                let Some(line) = self.lines[j].as_deref() else {
                    continue;
                };
                if date_header(line).is_some() {
                    return None;
                }
                if let Some(task) = task_line(line) {
                    if task.depth() < depth {
                        return Some(j);
                    }
                }
            }
            None
        }

        fn all_done(&self, idxs: &[usize]) -> bool {
            idxs.iter().all(|&j| {
                self.lines[j]
                    .as_deref()
                    .and_then(task_line)
                    .is_some_and(|t| t.is_done())
            })
        }

        fn complete(&mut self, idx: usize) {
            let Some(line) = self.lines[idx].as_deref() else {
                return;
            };
            let already = task_line(line).is_some_and(|t| t.is_done());
            if already {
                return;
            }
            if let Some(done) = with_marker(line, TaskStatus::Done.marker()) {
                debug!(line = idx, "completing parent");
                self.lines[idx] = Some(done);
                self.completed.push(idx);
            }
        }

        /// Delete `idx`, then walk up: a parent left without children goes too, a parent whose
        /// remaining children are all done is completed.
        fn delete_and_cascade(&mut self, idx: usize) {
            let mut current = idx;
            loop {
                let depth = self.depth(current);
                debug!(line = current, "removing line");
                self.lines[current] = None;
                let Some(depth) = depth else {
                    return;
                };
                let Some(parent) = self.parent(current, depth) else {
                    return;
                };
                let remaining = self.descendants(parent);
                if remaining.is_empty() {
                    current = parent;
                    continue;
                }
                if self.all_done(&remaining) {
                    self.complete(parent);
                }
                return;
            }
        }
    }

    /// Remove the lines at `removed` (0-based), highest first.
    ///
    /// A listed line that still has live children is kept rather than orphaning them; it is
    /// completed when all of those children are done. Unlisted lines are never deleted except
    /// by the upward cascade. Out-of-range indices are ignored.
    pub fn prune<S: AsRef<str>>(lines: &[S], removed: &[usize]) -> Pruned {
        let mut slots = Slots {
            lines: lines.iter().map(|l| Some(l.as_ref().to_string())).collect(),
            completed: Vec::new(),
        };
        let mut targets: Vec<usize> = removed.iter().copied().filter(|&i| i < lines.len()).collect();
        targets.sort_unstable();
        targets.dedup();

        for &idx in targets.iter().rev() {
            if slots.lines[idx].is_none() {
                continue;
            }
            let remaining = slots.descendants(idx);
            if remaining.is_empty() {
                slots.delete_and_cascade(idx);
            } else if slots.all_done(&remaining) {
                slots.complete(idx);
            }
        }

        let removed = slots
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_none())
            .map(|(idx, _)| idx)
            .collect();
        let mut completed = slots.completed;
        completed.sort_unstable();
        Pruned {
            lines: slots.lines.into_iter().flatten().collect(),
            removed,
            completed,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn lines(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }

        #[test]
        fn empty_parent_is_removed_with_its_last_child() {
            let pruned = prune(&lines(&["- [ ] P", "\t- [ ] Leaf"]), &[1]);
            assert!(pruned.lines.is_empty());
            assert_eq!(pruned.removed, vec![0, 1]);
        }

        #[test]
        fn parent_with_only_done_children_is_completed() {
            let pruned = prune(&lines(&["- [ ] P", "\t- [x] C1", "\t- [ ] Leaf"]), &[2]);
            assert_eq!(pruned.lines, lines(&["- [x] P", "\t- [x] C1"]));
            assert_eq!(pruned.completed, vec![0]);
        }

        #[test]
        fn parent_with_open_children_is_left_alone() {
            let doc = lines(&["- [x] P", "\t- [ ] other", "\t- [ ] Leaf"]);
            let pruned = prune(&doc, &[2]);
            assert_eq!(pruned.lines, lines(&["- [x] P", "\t- [ ] other"]));
            assert!(pruned.completed.is_empty());
        }

        #[test]
        fn cascade_climbs_several_levels() {
            let doc = lines(&[
                "2024-01-01",
                "- [ ] A",
                "\t- [ ] B",
                "\t\t- [ ] C",
                "- [ ] keep",
            ]);
            let pruned = prune(&doc, &[3]);
            assert_eq!(pruned.lines, lines(&["2024-01-01", "- [ ] keep"]));
        }

        #[test]
        fn listed_ancestors_are_settled_after_their_children() {
            let doc = lines(&["2024-01-01", "- [ ] P", "\t- [x] C1", "\t- [ ] Leaf", "- [ ] Q", "\t- [ ] L2"]);
            let pruned = prune(&doc, &[1, 3, 4, 5]);
            assert_eq!(pruned.lines, lines(&["2024-01-01", "- [x] P", "\t- [x] C1"]));
            assert_eq!(pruned.removed, vec![3, 4, 5]);
        }

        #[test]
        fn cascade_stops_at_section_boundary() {
            let doc = lines(&["- [ ] outside", "2024-01-01", "\t- [ ] nested"]);
            let pruned = prune(&doc, &[2]);
            assert_eq!(pruned.lines, lines(&["- [ ] outside", "2024-01-01"]));
        }

        #[test]
        fn in_progress_children_do_not_complete_parent() {
            let doc = lines(&["- [ ] P", "\t- [/] working", "\t- [ ] Leaf"]);
            let pruned = prune(&doc, &[2]);
            assert_eq!(pruned.lines, lines(&["- [ ] P", "\t- [/] working"]));
        }

        #[test]
        fn nothing_to_remove_is_a_no_op() {
            let doc = lines(&["2024-01-01", "- [ ] a"]);
            let pruned = prune(&doc, &[]);
            assert_eq!(pruned.lines, doc);
            assert!(pruned.removed.is_empty());
        }
    }
}

pub mod normalizer {
    //! Blank-line normalization and cursor anchoring.

    use crate::core::LineKind;
    use crate::document::{classify, date_header, is_blank};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Normalized {
        pub lines: Vec<String>,
        pub anchor_line: usize,
    }

    pub fn normalize<S: AsRef<str>>(lines: &[S], today: &str) -> Normalized {
        let lines = collapse_blank_lines(lines);
        let anchor_line = anchor_line(&lines, today);
        Normalized { lines, anchor_line }
    }

    /// One blank line before every date header after the first line; a blank line is otherwise
    /// kept only directly after a header or task line, and never twice in a row.
    pub fn collapse_blank_lines<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut after_structure = false;
        let mut after_blank = false;

        for line in lines {
            let line = line.as_ref();
            match classify(line) {
                LineKind::Blank => {
                    if after_structure && !after_blank {
                        out.push(line.to_string());
                        after_blank = true;
                    }
                }
                kind => {
                    if kind == LineKind::DateHeader && !after_blank && !out.is_empty() {
                        out.push(String::new());
                    }
                    out.push(line.to_string());
                    after_structure = matches!(kind, LineKind::DateHeader | LineKind::Task);
                    after_blank = false;
                }
            }
        }
        out
    }

    /// Last line of today's block: the line before the first blank or date header after
    /// today's header, or the last line of the document. 0 when today has no header.
    pub fn anchor_line<S: AsRef<str>>(lines: &[S], today: &str) -> usize {
        let Some(header) = lines
            .iter()
            .position(|l| date_header(l.as_ref()) == Some(today))
        else {
            return 0;
        };
        for (idx, line) in lines.iter().enumerate().skip(header + 1) {
            let line = line.as_ref();
            if is_blank(line) || date_header(line).is_some() {
                return idx - 1;
            }
        }
        lines.len() - 1
    }

}

pub mod archive {
    //! Month-level archiving of completed tasks.

    use crate::core::Result;
    use crate::document::{join_lines, month_key, split_lines, task_line};
    use crate::storage::DocumentStore;
    use indexmap::IndexMap;
    use serde::Serialize;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use tracing::{info, warn};

    /// Per-month verdict. A month is archivable only when none of its task lines is unfinished.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct MonthReport {
        pub month: String,
        pub archivable: bool,
        pub unfinished: usize,
        /// Done task lines, verbatim and in document order. Empty for non-archivable months.
        pub completed: Vec<String>,
        #[serde(skip)]
        pub completed_lines: Vec<usize>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ArchivePlan {
        pub months: IndexMap<String, MonthReport>,
        /// The document with every archivable month's done lines removed.
        pub remaining: Vec<String>,
    }

    /// Group task lines by the month of their enclosing date header.
    ///
    /// Task lines of any depth count. Lines are removed by position, so an identical line in a
    /// month that is not archivable stays put.
    pub fn archive_by_month<S: AsRef<str>>(lines: &[S]) -> ArchivePlan {
        let mut months: IndexMap<String, MonthReport> = IndexMap::new();
        let mut current: Option<String> = None;
        let mut done_at: IndexMap<String, Vec<usize>> = IndexMap::new();

        for (idx, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            if let Some(month) = month_key(line) {
                months.entry(month.to_string()).or_insert_with(|| MonthReport {
                    month: month.to_string(),
                    archivable: true,
                    unfinished: 0,
                    completed: Vec::new(),
                    completed_lines: Vec::new(),
                });
                current = Some(month.to_string());
                continue;
            }
            let (Some(month), Some(task)) = (current.as_ref(), task_line(line)) else {
                continue;
            };
            if task.is_unfinished() {
                if let Some(report) = months.get_mut(month) {
                    report.unfinished += 1;
                    report.archivable = false;
                }
            } else if task.is_done() {
                done_at.entry(month.clone()).or_default().push(idx);
            }
        }

        for report in months.values_mut() {
            if !report.archivable {
                continue;
            }
            if let Some(idxs) = done_at.shift_remove(&report.month) {
                report.completed = idxs.iter().map(|&i| lines[i].as_ref().to_string()).collect();
                report.completed_lines = idxs;
            }
        }

        let remaining = strip_months(lines, months.values());
        ArchivePlan { months, remaining }
    }

    /// Remove the completed lines of the given (archivable) months.
    pub fn strip_months<'a, S: AsRef<str>>(
        lines: &[S],
        months: impl IntoIterator<Item = &'a MonthReport>,
    ) -> Vec<String> {
        let drop: BTreeSet<usize> = months
            .into_iter()
            .filter(|m| m.archivable)
            .flat_map(|m| m.completed_lines.iter().copied())
            .collect();
        lines
            .iter()
            .enumerate()
            .filter(|(idx, _)| !drop.contains(idx))
            .map(|(_, l)| l.as_ref().to_string())
            .collect()
    }

    pub fn archive_file_name(month: &str) -> String {
        format!("archive-{month}.md")
    }

    /// Body of a month's archive file after adding `tasks`.
    pub fn render_archive_file(existing: Option<&str>, month: &str, tasks: &[String]) -> String {
        match existing {
            Some(body) => format!("{body}\n{}", tasks.join("\n")),
            None => format!("# {month} Archived tasks\n\n{}", tasks.join("\n")),
        }
    }

    /// What happened to each month during [`archive_document`].
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
    pub struct ArchiveRun {
        pub archived: Vec<String>,
        pub skipped: Vec<String>,
        pub failed: Vec<String>,
        pub months: Vec<MonthReport>,
    }

    /// Archive every eligible month of the document at `document` into `archive_dir`.
    ///
    /// A month whose archive file cannot be written keeps its lines in the document and the
    /// loop moves on; failing to write the trimmed document itself is returned as an error.
    pub fn archive_document<D: DocumentStore>(
        store: &D,
        document: &Path,
        archive_dir: &Path,
    ) -> Result<ArchiveRun> {
        let text = store.read(document)?;
        let lines = split_lines(&text);
        let plan = archive_by_month(&lines);

        let mut run = ArchiveRun::default();
        let mut committed: Vec<&MonthReport> = Vec::new();
        for report in plan.months.values() {
            if !report.archivable {
                info!(month = %report.month, unfinished = report.unfinished, "month has unfinished tasks, skipping");
                run.skipped.push(report.month.clone());
                continue;
            }
            if report.completed.is_empty() {
                continue;
            }
            let path: PathBuf = archive_dir.join(archive_file_name(&report.month));
            let existing = if store.exists(&path) {
                Some(store.read(&path)?)
            } else {
                None
            };
            let body = render_archive_file(existing.as_deref(), &report.month, &report.completed);
            match store.write(&path, &body) {
                Ok(()) => {
                    info!(month = %report.month, tasks = report.completed.len(), path = ?path, "archived month");
                    run.archived.push(report.month.clone());
                    committed.push(report);
                }
                Err(err) => {
                    warn!(month = %report.month, error = %err, "failed to write archive file");
                    run.failed.push(report.month.clone());
                }
            }
        }

        if !committed.is_empty() {
            let remaining = strip_months(&lines, committed);
            store.write(document, &join_lines(&remaining))?;
        }
        run.months = plan.months.into_values().collect();
        Ok(run)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::Error;
        use crate::storage::MemoryStore;

        fn lines(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }

        fn sample() -> Vec<String> {
            lines(&[
                "2024-02-01",
                "- [x] feb done",
                "- [ ] feb open",
                "- [x] same text",
                "2024-01-31",
                "- [x] jan a",
                "\t- [x] jan nested",
                "- [x] same text",
                "2024-01-02",
                "- [x] jan b",
            ])
        }

        #[test]
        fn month_with_open_task_is_not_archivable() {
            let plan = archive_by_month(&sample());
            let feb = &plan.months["2024-02"];
            assert!(!feb.archivable);
            assert_eq!(feb.unfinished, 1);
            assert!(feb.completed.is_empty());

            let jan = &plan.months["2024-01"];
            assert!(jan.archivable);
            assert_eq!(
                jan.completed,
                vec!["- [x] jan a", "\t- [x] jan nested", "- [x] same text", "- [x] jan b"]
            );
        }

        #[test]
        fn remaining_keeps_identical_lines_of_other_months() {
            let plan = archive_by_month(&sample());
            assert_eq!(
                plan.remaining,
                lines(&[
                    "2024-02-01",
                    "- [x] feb done",
                    "- [ ] feb open",
                    "- [x] same text",
                    "2024-01-31",
                    "2024-01-02",
                ])
            );
        }

        #[test]
        fn in_progress_blocks_archiving_even_with_many_done() {
            let mut doc = lines(&["2024-03-01", "- [/] half"]);
            for i in 0..10 {
                doc.push(format!("- [x] done {i}"));
            }
            let plan = archive_by_month(&doc);
            assert!(!plan.months["2024-03"].archivable);
            assert_eq!(plan.remaining, doc);
        }

        #[test]
        fn archive_file_header_then_append() {
            let first = render_archive_file(None, "2024-01", &lines(&["- [x] a"]));
            assert_eq!(first, "# 2024-01 Archived tasks\n\n- [x] a");
            let second = render_archive_file(Some(&first), "2024-01", &lines(&["- [x] b"]));
            assert_eq!(second, "# 2024-01 Archived tasks\n\n- [x] a\n- [x] b");
        }

        #[test]
        fn archive_document_writes_files_and_trims() {
            let store = MemoryStore::default();
            let doc = Path::new("todo.md");
            store.insert(doc, &sample().join("\n"));
            let dir = Path::new("simple-todo");

            let run = archive_document(&store, doc, dir).expect("archive");
            assert_eq!(run.archived, vec!["2024-01"]);
            assert_eq!(run.skipped, vec!["2024-02"]);
            assert!(run.failed.is_empty());

            let archived = store.get(&dir.join("archive-2024-01.md")).expect("archive file");
            assert!(archived.starts_with("# 2024-01 Archived tasks\n\n- [x] jan a"));
            let trimmed = store.get(doc).expect("document");
            assert!(!trimmed.contains("jan a"));
            assert!(trimmed.contains("feb open"));
        }

        #[test]
        fn failed_archive_write_keeps_month_in_document() {
            let store = MemoryStore::default();
            let doc = Path::new("todo.md");
            let original = sample().join("\n");
            store.insert(doc, &original);
            let dir = Path::new("locked");
            store.reject_writes_to(&dir.join("archive-2024-01.md"));

            let run = archive_document(&store, doc, dir).expect("archive");
            assert_eq!(run.failed, vec!["2024-01"]);
            assert!(run.archived.is_empty());
            assert_eq!(store.get(doc).as_deref(), Some(original.as_str()));
        }

        #[test]
        fn failing_document_write_is_an_error() {
            let store = MemoryStore::default();
            let doc = Path::new("todo.md");
            store.insert(doc, &sample().join("\n"));
            store.reject_writes_to(doc);

            let err = archive_document(&store, doc, Path::new("a")).expect_err("write must fail");
            assert!(matches!(err, Error::Write { ref path, .. } if path == doc));
        }
    }
}

pub mod toggle {
    //! Cycling a single task line's status.

    use crate::core::{Error, Result, TaskStatus};
    use crate::document::task_line;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct Toggled {
        pub line: String,
        /// `None` when the marker was not a recognized status.
        pub from: Option<TaskStatus>,
        pub to: TaskStatus,
    }

    /// Rewrite a task line as `{indent}- [{next}] {content}`. Unrecognized markers become `[ ]`.
    pub fn toggle(line: &str) -> Option<Toggled> {
        let task = task_line(line)?;
        let from = task.status();
        let to = from.map(TaskStatus::next).unwrap_or(TaskStatus::Todo);
        Some(Toggled {
            line: format!("{}- [{}] {}", task.indent, to.marker(), task.content),
            from,
            to,
        })
    }

    /// Toggle the line at `index` (0-based) in place.
    pub fn toggle_at(lines: &mut [String], index: usize) -> Result<Toggled> {
        let len = lines.len();
        let line = lines
            .get_mut(index)
            .ok_or(Error::LineOutOfRange { line: index + 1, len })?;
        let toggled = toggle(line).ok_or(Error::NotATask { line: index + 1 })?;
        *line = toggled.line.clone();
        Ok(toggled)
    }

}

pub mod reschedule {
    //! End-to-end carry-over of unfinished tasks into today's section.

    use crate::core::ScanOrigin;
    use crate::document::{join_lines, split_lines};
    use crate::locator::locate;
    use crate::migrator::{place, reset_status};
    use crate::normalizer::normalize;
    use crate::pruner::prune;
    use chrono::NaiveDate;
    use serde::Serialize;
    use tracing::info;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RescheduleRequest {
        pub today: NaiveDate,
        /// 0-based line where a missing today section is created.
        pub cursor_line: usize,
        pub origin: ScanOrigin,
        /// Append a short weekday name to a newly created header.
        pub weekday_label: bool,
    }

    impl RescheduleRequest {
        pub fn new(today: NaiveDate) -> Self {
            Self {
                today,
                cursor_line: 0,
                origin: ScanOrigin::DocumentStart,
                weekday_label: true,
            }
        }
    }

    #[serde_with::skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct RescheduleOutcome {
        pub found: bool,
        pub source_date: Option<String>,
        /// Lines as they were in the source section.
        pub moved: Vec<String>,
        /// 1-based line numbers of `moved` in the original document.
        pub source_lines: Vec<usize>,
        #[serde(skip)]
        pub original_text: String,
        pub preview_text: String,
        /// 0-based line for the cursor after committing `preview_text`.
        pub anchor_line: usize,
    }

    impl RescheduleOutcome {
        pub fn changed(&self) -> bool {
            self.original_text != self.preview_text
        }
    }

    pub fn header_line(date: NaiveDate, weekday_label: bool) -> String {
        if weekday_label {
            date.format("%Y-%m-%d %a").to_string()
        } else {
            date.format("%Y-%m-%d").to_string()
        }
    }

    /// Move the unfinished leaves of the nearest earlier section (with their ancestors) under
    /// today's header. Nothing is written; the caller commits `preview_text` if it wants it.
    pub fn reschedule(text: &str, request: &RescheduleRequest) -> RescheduleOutcome {
        let today = request.today.format("%Y-%m-%d").to_string();
        let lines = split_lines(text);
        let harvest = locate(&lines, &today, request.origin);

        if harvest.is_empty() {
            info!(today = %today, "no unfinished tasks to reschedule");
            return RescheduleOutcome {
                found: false,
                source_date: None,
                moved: Vec::new(),
                source_lines: Vec::new(),
                original_text: text.to_string(),
                preview_text: text.to_string(),
                anchor_line: request.cursor_line,
            };
        }

        let incoming: Vec<String> = harvest.lines.iter().map(|l| reset_status(l)).collect();
        let pruned = prune(&lines, &harvest.indices());
        let shift = pruned
            .removed
            .iter()
            .filter(|&&idx| idx < request.cursor_line)
            .count();
        let insert_at = request.cursor_line.saturating_sub(shift);

        let placed = place(
            &pruned.lines,
            &today,
            &incoming,
            insert_at,
            &header_line(request.today, request.weekday_label),
        );
        let normalized = normalize(&placed, &today);

        info!(
            source_date = harvest.source_date.as_deref().unwrap_or_default(),
            moved = incoming.len(),
            removed = pruned.removed.len(),
            completed = pruned.completed.len(),
            "rescheduled tasks"
        );

        RescheduleOutcome {
            found: true,
            source_date: harvest.source_date,
            moved: harvest.lines,
            source_lines: harvest.line_numbers,
            original_text: text.to_string(),
            preview_text: join_lines(&normalized.lines),
            anchor_line: normalized.anchor_line,
        }
    }

}

pub mod config {
    //! TOML settings for the CLI.

    use crate::core::{Error, Result, ScanOrigin};
    use serde::{Deserialize, Serialize};
    use std::fs;
    use std::path::{Path, PathBuf};

    pub const CONFIG_FILE: &str = ".daytodo.toml";

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Settings {
        /// Directory receiving `archive-YYYY-MM.md`; relative paths hang off the document's
        /// directory.
        pub archive_dir: PathBuf,
        pub weekday_label: bool,
        /// Start the locator at the cursor line instead of the top of the document.
        pub scan_from_cursor: bool,
        /// Print the rescheduled document instead of writing it unless asked to write.
        pub preview: bool,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                archive_dir: PathBuf::from("simple-todo"),
                weekday_label: true,
                scan_from_cursor: false,
                preview: true,
            }
        }
    }

    impl Settings {
        pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
            toml::from_str(text)
        }

        /// Load settings from `path`; a missing file yields the defaults.
        pub fn load(path: &Path) -> Result<Self> {
            if !path.exists() {
                return Ok(Self::default());
            }
            let text = fs::read_to_string(path).map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&text).map_err(|source| Error::Config {
                path: path.to_path_buf(),
                source,
            })
        }

        /// `CONFIG_FILE` next to the document.
        pub fn discover(document: &Path) -> Result<Self> {
            Self::load(&document_dir(document).join(CONFIG_FILE))
        }

        pub fn archive_root(&self, document: &Path) -> PathBuf {
            if self.archive_dir.is_absolute() {
                self.archive_dir.clone()
            } else {
                document_dir(document).join(&self.archive_dir)
            }
        }

        pub fn scan_origin(&self, cursor_line: usize) -> ScanOrigin {
            if self.scan_from_cursor {
                ScanOrigin::Line(cursor_line)
            } else {
                ScanOrigin::DocumentStart
            }
        }
    }

    fn document_dir(document: &Path) -> PathBuf {
        document
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn partial_toml_falls_back_to_defaults() {
            let s = Settings::from_toml_str("scan_from_cursor = true\n").expect("parse");
            assert!(s.scan_from_cursor);
            assert!(s.weekday_label);
            assert_eq!(s.archive_dir, PathBuf::from("simple-todo"));
            assert_eq!(s.scan_origin(4), ScanOrigin::Line(4));
            assert_eq!(Settings::default().scan_origin(4), ScanOrigin::DocumentStart);
        }

        #[test]
        fn missing_file_is_default_and_bad_file_is_error() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let doc = tmp.path().join("todo.md");
            assert_eq!(Settings::discover(&doc).expect("defaults"), Settings::default());

            fs::write(tmp.path().join(CONFIG_FILE), "preview = \"maybe\"").expect("write");
            assert!(matches!(Settings::discover(&doc), Err(Error::Config { .. })));
        }

        #[test]
        fn archive_root_is_relative_to_document() {
            let s = Settings::default();
            assert_eq!(
                s.archive_root(Path::new("notes/todo.md")),
                PathBuf::from("notes/simple-todo")
            );
        }
    }
}

pub mod storage {
    //! The document store collaborator: text in, text out.

    use crate::core::{Error, Result};
    use std::fs;
    use std::path::Path;

    pub trait DocumentStore {
        fn exists(&self, id: &Path) -> bool;
        fn read(&self, id: &Path) -> Result<String>;
        fn write(&self, id: &Path, text: &str) -> Result<()>;
    }

    /// Plain files; parent directories are created on write.
    pub struct FsStore;

    impl DocumentStore for FsStore {
        fn exists(&self, id: &Path) -> bool {
            id.is_file()
        }

        fn read(&self, id: &Path) -> Result<String> {
            fs::read_to_string(id).map_err(|source| Error::Read {
                path: id.to_path_buf(),
                source,
            })
        }

        fn write(&self, id: &Path, text: &str) -> Result<()> {
            let write = || -> std::io::Result<()> {
                if let Some(dir) = id.parent().filter(|d| !d.as_os_str().is_empty()) {
                    fs::create_dir_all(dir)?;
                }
                fs::write(id, text)
            };
            write().map_err(|source| Error::Write {
                path: id.to_path_buf(),
                source,
            })
        }
    }

    #[cfg(test)]
    pub(crate) use memory::MemoryStore;


    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn fs_store_round_trips_and_creates_directories() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("nested/dir/todo.md");
            assert!(!FsStore.exists(&path));
            FsStore.write(&path, "2024-01-01\n").expect("write");
            assert!(FsStore.exists(&path));
            assert_eq!(FsStore.read(&path).expect("read"), "2024-01-01\n");
        }

        #[test]
        fn fs_store_read_error_names_path() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("missing.md");
            match FsStore.read(&path) {
                Err(Error::Read { path: p, .. }) => assert_eq!(p, path),
                other => panic!("expected read error, got {other:?}"),
            }
        }
    }
}

pub use crate::core::{Error, LineKind, ScanOrigin, TaskStatus};
pub use locator::locate;
pub use migrator::merge;
pub use normalizer::normalize;
pub use pruner::prune;
pub use reschedule::{RescheduleOutcome, RescheduleRequest, reschedule};
