//! Turning fetched source trees into a unit's file set.
//!
//! A tree is the `src/` directory of a package, with paths like
//! `/src/index.ts`, plus an optional prebuilt bundle. When the parser and
//! support come from one tree it is used as is; separate trees are
//! re-rooted under `/parser` and `/support`. The index entry is always a
//! synthesized `/config.ts`.

use crate::role::Role;
use crate::store::{SrcFile, UnitFiles};
use once_cell::sync::Lazy;
use regex::Regex;

static SRC_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/src").expect("valid regex"));

/// Path of the synthesized index entry.
pub const CONFIG_PATH: &str = "/config.ts";

/// One fetched package tree.
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    pub files: Vec<SrcFile>,
    pub prebuilt: Option<SrcFile>,
}

impl SourceTree {
    pub fn new(files: Vec<SrcFile>) -> Self {
        Self { files, prebuilt: None }
    }

    pub fn with_prebuilt(mut self, prebuilt: SrcFile) -> Self {
        self.prebuilt = Some(prebuilt);
        self
    }
}

/// Tag the entry file of `role`.
///
/// A lone file is the entry. Otherwise the first file ending in
/// `.grammar` (parser only), `index.ts`, `index.js`, `<fallback>.ts` or
/// `<fallback>.js`, in that order of preference. Returns the tagged path.
pub fn mark_entry(files: &mut [SrcFile], role: Role, fallback: &str) -> Option<String> {
    if let [only] = files {
        only.entry.insert(role);
        return Some(only.path.clone());
    }

    let mut candidates = vec![
        ".grammar".to_string(),
        "index.ts".to_string(),
        "index.js".to_string(),
        format!("{}.ts", fallback),
        format!("{}.js", fallback),
    ];
    if role != Role::Parser {
        candidates.remove(0);
    }
    for candidate in &candidates {
        if let Some(file) = files.iter_mut().find(|f| f.path.ends_with(candidate.as_str())) {
            file.entry.insert(role);
            return Some(file.path.clone());
        }
    }
    None
}

fn reroot(files: &mut [SrcFile], prefix: &str) {
    for file in files {
        file.path = format!("{}{}", prefix, SRC_ROOT.replace(&file.path, ""));
    }
}

/// Build a unit file set from its parser tree, an optional separate
/// support tree and the index module text.
///
/// `lang` names the fallback entry (`<lang>.ts`). The prebuilt snapshot
/// is kept only when every tree involved has one.
pub fn assemble(parser: SourceTree, support: Option<SourceTree>, config: &str, lang: &str) -> UnitFiles {
    let mut src: Vec<SrcFile>;
    let mut prebuilt = None;

    match support {
        None => {
            let mut tree = parser;
            mark_entry(&mut tree.files, Role::Parser, lang);
            mark_entry(&mut tree.files, Role::Support, lang);
            src = tree.files;
            if let Some(snapshot) = tree.prebuilt {
                prebuilt = Some(vec![snapshot.entry_of(Role::Parser).entry_of(Role::Support)]);
            }
        }
        Some(mut support) => {
            let mut parser = parser;
            reroot(&mut parser.files, "/parser");
            reroot(&mut support.files, "/support");
            mark_entry(&mut parser.files, Role::Parser, lang);
            mark_entry(&mut support.files, Role::Support, lang);
            if let (Some(p), Some(s)) = (parser.prebuilt, support.prebuilt) {
                prebuilt = Some(vec![p.entry_of(Role::Parser), s.entry_of(Role::Support)]);
            }
            src = parser.files;
            src.extend(support.files);
        }
    }

    src.insert(0, SrcFile::new(CONFIG_PATH, config).entry_of(Role::Index));
    // stable: entries first, order otherwise kept
    src.sort_by_key(|file| !file.is_entry());

    UnitFiles { src, prebuilt }
}

/// The module name a repository path implies: its last word.
pub fn language_name(repo: &str) -> Option<&str> {
    static LAST_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+$").expect("valid regex"));
    LAST_WORD.find(repo).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> Vec<SrcFile> {
        paths.iter().map(|p| SrcFile::new(*p, "")).collect()
    }

    fn entries(files: &[SrcFile], role: Role) -> Vec<&str> {
        files
            .iter()
            .filter(|f| f.entry.contains(role))
            .map(|f| f.path.as_str())
            .collect()
    }

    #[test]
    fn test_single_file_is_entry() {
        let mut fs = files(&["/bundle.js"]);
        assert_eq!(mark_entry(&mut fs, Role::Support, "x").as_deref(), Some("/bundle.js"));
    }

    #[test]
    fn test_entry_preference() {
        let mut fs = files(&["/src/tokens.js", "/src/index.ts", "/src/syntax.grammar"]);
        assert_eq!(mark_entry(&mut fs, Role::Parser, "css").as_deref(), Some("/src/syntax.grammar"));
        assert_eq!(mark_entry(&mut fs, Role::Support, "css").as_deref(), Some("/src/index.ts"));

        let mut fs = files(&["/src/helpers.ts", "/src/css.ts"]);
        assert_eq!(mark_entry(&mut fs, Role::Support, "css").as_deref(), Some("/src/css.ts"));
        assert_eq!(mark_entry(&mut fs, Role::Support, "json"), None);
    }

    #[test]
    fn test_assemble_one_tree() {
        let tree = SourceTree::new(files(&["/src/tokens.js", "/src/index.ts", "/src/syntax.grammar", "/package.json"]))
            .with_prebuilt(SrcFile::new("/dist/index.js", ""));
        let unit = assemble(tree, None, "export {parser} from './parser'", "example");

        let paths: Vec<&str> = unit.src.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/config.ts", "/src/index.ts", "/src/syntax.grammar", "/src/tokens.js", "/package.json"]
        );
        assert_eq!(entries(&unit.src, Role::Index), vec!["/config.ts"]);
        assert_eq!(entries(&unit.src, Role::Parser), vec!["/src/syntax.grammar"]);
        assert_eq!(entries(&unit.src, Role::Support), vec!["/src/index.ts"]);

        let prebuilt = unit.prebuilt.unwrap();
        assert!(prebuilt[0].entry.contains(Role::Parser) && prebuilt[0].entry.contains(Role::Support));
    }

    #[test]
    fn test_assemble_separate_trees() {
        let parser = SourceTree::new(files(&["/src/index.ts", "/src/syntax.grammar"]))
            .with_prebuilt(SrcFile::new("/dist/index.js", ""));
        let support = SourceTree::new(files(&["/src/index.ts", "/src/complete.ts"]));
        let unit = assemble(parser, Some(support), "", "lang");

        assert_eq!(entries(&unit.src, Role::Parser), vec!["/parser/syntax.grammar"]);
        assert_eq!(entries(&unit.src, Role::Support), vec!["/support/index.ts"]);
        assert!(unit.src.iter().any(|f| f.path == "/support/complete.ts"));
        // only one tree had a snapshot
        assert!(unit.prebuilt.is_none());
    }

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("codemirror/lang-example"), Some("example"));
        assert_eq!(language_name("lezer-parser/javascript"), Some("javascript"));
    }
}
