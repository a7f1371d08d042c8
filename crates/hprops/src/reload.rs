//! keep a tree in sync with its file
//!
//! [Reloader] owns a background thread that polls the modification time of one file. When it changes the whole
//! pipeline runs again and the new tree replaces the old one in a [SharedProperties]. Readers get either the old
//! or the new tree, an `Arc` they already hold is not updated.
use crate::factory::{self, Error, LoadOptions};
use crate::resource::{LoadError, ResourceLoader};
use crate::tree::Properties;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Handle to the current tree, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct SharedProperties(Arc<RwLock<Arc<Properties>>>);

impl SharedProperties {
    pub fn new(tree: Properties) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(tree))))
    }

    /// Current tree
    pub fn load(&self) -> Arc<Properties> {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn store(&self, tree: Properties) {
        let tree = Arc::new(tree);
        match self.0.write() {
            Ok(mut guard) => *guard = tree,
            Err(poisoned) => *poisoned.into_inner() = tree,
        }
    }
}

pub struct Reloader {
    shared: SharedProperties,
    stop: crossbeam_channel::Sender<()>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Reloader {
    /// Load `path` and watch it until stopped
    ///
    /// Fails when the first load fails. Later failures are logged and the previous tree stays in place.
    pub fn start<L>(
        path: impl Into<PathBuf>,
        loader: L,
        options: LoadOptions,
        interval: Duration,
    ) -> Result<Self, Error>
    where
        L: ResourceLoader + Send + 'static,
    {
        let path = path.into();
        let modified = modified(&path).ok();
        let shared = SharedProperties::new(factory::from_path(&path, &loader, &options)?);

        let (stop, stopped) = crossbeam_channel::bounded(1);
        let mut watch = Watch {
            path: path.clone(),
            loader,
            options,
            shared: shared.clone(),
            modified,
        };

        let handle = std::thread::Builder::new()
            .name("hprops-reload".to_string())
            .spawn(move || watch.run(stopped, interval))
            .map_err(|source| LoadError::Io {
                locator: path.display().to_string(),
                source,
            })?;

        Ok(Self {
            shared,
            stop,
            handle: Some(handle),
        })
    }

    pub fn properties(&self) -> SharedProperties {
        self.shared.clone()
    }

    /// Stop watching and wait for the thread to end
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("reload thread panicked");
            }
        }
    }
}

impl Drop for Reloader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Watch<L> {
    path: PathBuf,
    loader: L,
    options: LoadOptions,
    shared: SharedProperties,
    modified: Option<SystemTime>,
}

impl<L: ResourceLoader> Watch<L> {
    fn run(&mut self, stopped: crossbeam_channel::Receiver<()>, interval: Duration) {
        tracing::debug!(path=%self.path.display(), ?interval, "watching");
        loop {
            crossbeam_channel::select! {
                recv(stopped) -> _ => break,
                default(interval) => self.poll(),
            }
        }
        tracing::debug!(path=%self.path.display(), "stopped watching");
    }

    fn poll(&mut self) {
        let modified = match modified(&self.path) {
            Ok(modified) => modified,
            Err(error) => {
                tracing::warn!(path=%self.path.display(), %error, "unable to read modification time");
                return;
            }
        };
        if self.modified == Some(modified) {
            return;
        }
        self.modified = Some(modified);

        match factory::from_path(&self.path, &self.loader, &self.options) {
            Ok(tree) => {
                tracing::info!(path=%self.path.display(), nodes = tree.node_count(), "reloaded");
                self.shared.store(tree);
            }
            Err(error) => {
                tracing::warn!(path=%self.path.display(), error=%DisplayChain(&error), "reload failed, keeping the previous tree");
            }
        }
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// `error: cause: cause`
struct DisplayChain<'a>(&'a dyn std::error::Error);

impl std::fmt::Display for DisplayChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::DefaultLoader;
    use pretty_assertions::assert_eq;

    fn temp_file(name: &str, text: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hprops-reload-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Rewrite with a modification time that is guaranteed to differ
    fn rewrite(path: &Path, text: &str, age: u64) {
        std::fs::write(path, text).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(age))
            .unwrap();
    }

    fn wait_for(shared: &SharedProperties, expected: &str) -> bool {
        for _ in 0..500 {
            if shared.load().root().property("value") == Some(expected) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn shared_swap() {
        let shared = SharedProperties::default();
        let before = shared.load();

        let mut tree = Properties::new();
        let root = tree.root_id();
        tree.insert_property(root, "value", "1");
        shared.clone().store(tree);

        assert_eq!(before.root().property("value"), None);
        assert_eq!(shared.load().root().property("value"), Some("1"));
    }

    #[test]
    fn reloads_on_change_and_keeps_last_good_tree() {
        let path = temp_file("watched.hprops", "value = first\n");
        let reloader = Reloader::start(
            &path,
            DefaultLoader::new(std::env::temp_dir()),
            LoadOptions::default(),
            Duration::from_millis(5),
        )
        .unwrap();
        let shared = reloader.properties();
        assert_eq!(shared.load().root().property("value"), Some("first"));

        rewrite(&path, "value = second\n", 10);
        assert!(wait_for(&shared, "second"));

        rewrite(&path, "value = ${ENV.HPROPS_SURELY_UNDEFINED}\n", 20);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(shared.load().root().property("value"), Some("second"));

        rewrite(&path, "value = third\n", 30);
        assert!(wait_for(&shared, "third"));

        reloader.stop();
    }

    #[test]
    fn start_fails_on_invalid_file() {
        let path = temp_file("invalid.hprops", "= nope\n");
        let result = Reloader::start(
            &path,
            DefaultLoader::new(std::env::temp_dir()),
            LoadOptions::default(),
            Duration::from_millis(5),
        );
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
