//! Virtual file store of a language unit.
//!
//! Files keep their insertion order. Content is either ready text or a
//! shared pending loader; the first read of a pending file awaits the
//! loader and, if the file was not replaced meanwhile, keeps the text.

use crate::role::{Role, RoleSet};
use futures::future::{BoxFuture, FutureExt, Shared};
use loom_engine::{ResolveError, SourceKind};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Shared loader of a file's text.
pub type Loader = Shared<BoxFuture<'static, Result<Arc<str>, String>>>;

#[derive(Clone)]
pub enum Content {
    Ready(Arc<str>),
    Pending(Loader),
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Ready(text) => write!(f, "Ready({} bytes)", text.len()),
            Content::Pending(_) => write!(f, "Pending"),
        }
    }
}

/// One file of a unit.
#[derive(Debug, Clone)]
pub struct SrcFile {
    pub path: String,
    pub content: Content,
    /// Roles this file is the entry of
    pub entry: RoleSet,
}

impl SrcFile {
    pub fn new(path: impl Into<String>, text: impl AsRef<str>) -> Self {
        Self {
            path: path.into(),
            content: Content::Ready(Arc::from(text.as_ref())),
            entry: RoleSet::EMPTY,
        }
    }

    /// A file whose text is fetched on first read.
    pub fn lazy<F>(path: impl Into<String>, loader: F) -> Self
    where
        F: Future<Output = Result<String, String>> + Send + 'static,
    {
        let loader = loader.map(|result| result.map(Arc::<str>::from)).boxed().shared();
        Self {
            path: path.into(),
            content: Content::Pending(loader),
            entry: RoleSet::EMPTY,
        }
    }

    pub fn entry_of(mut self, role: Role) -> Self {
        self.entry.insert(role);
        self
    }

    pub fn is_entry(&self) -> bool {
        !self.entry.is_empty()
    }

    /// Text, if already loaded.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Ready(text) => Some(text),
            Content::Pending(_) => None,
        }
    }
}

/// Ordered, mutable set of [`SrcFile`]s.
#[derive(Debug, Default)]
pub struct FileStore {
    files: RwLock<Vec<SrcFile>>,
}

impl FileStore {
    pub fn new(files: Vec<SrcFile>) -> Self {
        Self {
            files: RwLock::new(files),
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.read().iter().map(|f| f.path.clone()).collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.read().iter().any(|f| f.path == path)
    }

    /// Copy of the file list, in order.
    pub fn snapshot(&self) -> Vec<SrcFile> {
        self.files.read().clone()
    }

    /// Read a file's text, awaiting its loader if it is still pending.
    pub async fn read(&self, path: &str) -> Result<Arc<str>, ResolveError> {
        let content = self
            .files
            .read()
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content.clone())
            .ok_or_else(|| ResolveError::not_found(path))?;

        let loader = match content {
            Content::Ready(text) => return Ok(text),
            Content::Pending(loader) => loader,
        };
        let text = loader.clone().await.map_err(|e| ResolveError::failed(path, e))?;

        let mut files = self.files.write();
        if let Some(file) = files.iter_mut().find(|f| f.path == path) {
            let unchanged = matches!(&file.content, Content::Pending(current) if current.ptr_eq(&loader));
            if unchanged {
                debug!(path = %path, "file loaded");
                file.content = Content::Ready(text.clone());
            }
        }
        Ok(text)
    }

    /// Replace a file's text. Returns whether the content actually
    /// changed; unknown paths are ignored.
    pub fn change(&self, path: &str, text: &str) -> bool {
        let mut files = self.files.write();
        let Some(file) = files.iter_mut().find(|f| f.path == path) else {
            return false;
        };
        if matches!(&file.content, Content::Ready(current) if current.as_ref() == text) {
            return false;
        }
        file.content = Content::Ready(Arc::from(text));
        true
    }

    /// Find `path` exactly, then with each suffix appended. Returns the
    /// matched path and how to load it.
    pub fn lookup(&self, path: &str, suffixes: &[String]) -> Option<(String, SourceKind)> {
        let files = self.files.read();
        let candidates = std::iter::once(path.to_string()).chain(suffixes.iter().map(|s| format!("{}{}", path, s)));
        for candidate in candidates {
            if files.iter().any(|f| f.path == candidate) {
                let kind = SourceKind::from_path(&candidate);
                return Some((candidate, kind));
            }
        }
        None
    }

    /// Path of the first file tagged as `role`'s entry.
    pub fn entry_for(&self, role: Role) -> Option<String> {
        self.files
            .read()
            .iter()
            .find(|f| f.entry.contains(role))
            .map(|f| f.path.clone())
    }

    pub fn first_with_suffix(&self, suffix: &str) -> Option<String> {
        self.files
            .read()
            .iter()
            .find(|f| f.path.ends_with(suffix))
            .map(|f| f.path.clone())
    }
}

/// File set of a unit: its sources plus an optional prebuilt snapshot.
#[derive(Debug, Clone, Default)]
pub struct UnitFiles {
    pub src: Vec<SrcFile>,
    pub prebuilt: Option<Vec<SrcFile>>,
}

impl UnitFiles {
    pub fn new(src: Vec<SrcFile>) -> Self {
        Self { src, prebuilt: None }
    }

    pub fn with_prebuilt(mut self, prebuilt: Vec<SrcFile>) -> Self {
        self.prebuilt = Some(prebuilt);
        self
    }
}

impl From<Vec<SrcFile>> for FileStore {
    fn from(files: Vec<SrcFile>) -> Self {
        FileStore::new(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn suffixes() -> Vec<String> {
        vec![".ts".to_string(), ".js".to_string()]
    }

    #[test]
    fn test_lookup_order() {
        let store = FileStore::new(vec![
            SrcFile::new("/a.js", "js"),
            SrcFile::new("/a.ts", "ts"),
            SrcFile::new("/b", "plain"),
        ]);
        assert_eq!(store.lookup("/a", &suffixes()), Some(("/a.ts".to_string(), SourceKind::Typed)));
        assert_eq!(store.lookup("/a.js", &suffixes()), Some(("/a.js".to_string(), SourceKind::Script)));
        assert_eq!(store.lookup("/b", &suffixes()), Some(("/b".to_string(), SourceKind::Script)));
        assert_eq!(store.lookup("/c", &suffixes()), None);
    }

    #[test]
    fn test_change_reports_real_changes() {
        let store = FileStore::new(vec![SrcFile::new("/a.ts", "one")]);
        assert!(!store.change("/a.ts", "one"));
        assert!(store.change("/a.ts", "two"));
        assert!(!store.change("/new.ts", "fresh"));
        assert_eq!(store.paths(), vec!["/a.ts"]);
    }

    #[test]
    fn test_entries() {
        let store = FileStore::new(vec![
            SrcFile::new("/lib.ts", ""),
            SrcFile::new("/config.ts", "").entry_of(Role::Index),
            SrcFile::new("/both.ts", "").entry_of(Role::Parser).entry_of(Role::Support),
            SrcFile::new("/x.grammar", ""),
        ]);
        assert_eq!(store.entry_for(Role::Index).as_deref(), Some("/config.ts"));
        assert_eq!(store.entry_for(Role::Support).as_deref(), Some("/both.ts"));
        assert_eq!(store.first_with_suffix(".grammar").as_deref(), Some("/x.grammar"));
    }

    #[tokio::test]
    async fn test_pending_file_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store = FileStore::new(vec![SrcFile::lazy("/lazy.js", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("export default 1".to_string())
        })]);

        let (a, b) = tokio::join!(store.read("/lazy.js"), store.read("/lazy.js"));
        assert_eq!(a.unwrap().as_ref(), "export default 1");
        assert_eq!(b.unwrap().as_ref(), "export default 1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot()[0].text(), Some("export default 1"));
    }

    #[tokio::test]
    async fn test_replaced_pending_file_keeps_new_text() {
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let store = FileStore::new(vec![SrcFile::lazy("/f.js", async move {
            let _ = gate.await;
            Ok("old".to_string())
        })]);

        let mut read = Box::pin(store.read("/f.js"));
        assert!(futures::poll!(&mut read).is_pending());
        assert!(store.change("/f.js", "new"));
        release.send(()).unwrap();

        assert_eq!(read.await.unwrap().as_ref(), "old");
        assert_eq!(store.snapshot()[0].text(), Some("new"));
    }

    #[tokio::test]
    async fn test_failed_loader() {
        let store = FileStore::new(vec![SrcFile::lazy("/gone.js", async { Err("404".to_string()) })]);
        let err = store.read("/gone.js").await.unwrap_err();
        assert_eq!(err, ResolveError::failed("/gone.js", "404"));
        let err = store.read("/missing.js").await.unwrap_err();
        assert_eq!(err, ResolveError::not_found("/missing.js"));
    }
}
