//! access to external text and variables
//!
//! Includes (`!<file:...>`, `!<classpath:...>`, `!<http:...>`) and `ENV.`/`SYS.` substitutions never touch the
//! outside world directly. They go through a [ResourceLoader], so callers can swap in their own source of bytes
//! (tests use an in-memory loader).
use std::path::{Path, PathBuf};

/// Include schemes understood by the preprocessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    File,
    Classpath,
    Http,
}

impl Scheme {
    pub const ALL: [Scheme; 3] = [Scheme::Classpath, Scheme::File, Scheme::Http];

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scheme| scheme.prefix() == prefix)
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Scheme::File => "file",
            Scheme::Classpath => "classpath",
            Scheme::Http => "http",
        }
    }

    /// Fetch `locator` with this scheme
    pub fn fetch(&self, loader: &dyn ResourceLoader, locator: &str) -> Result<String, LoadError> {
        loader.fetch(*self, locator)
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// `ENV.` or `SYS.` prefix of an external variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum External {
    Env,
    Sys,
}

impl External {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "ENV" => Some(External::Env),
            "SYS" => Some(External::Sys),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            External::Env => "ENV",
            External::Sys => "SYS",
        }
    }

    pub fn lookup(&self, loader: &dyn ResourceLoader, name: &str) -> Option<String> {
        match self {
            External::Env => loader.lookup_env(name),
            External::Sys => loader.lookup_system_property(name),
        }
    }
}

impl std::fmt::Display for External {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Source of included text and external variables
pub trait ResourceLoader {
    fn fetch(&self, scheme: Scheme, locator: &str) -> Result<String, LoadError>;

    fn lookup_env(&self, name: &str) -> Option<String>;

    fn lookup_system_property(&self, name: &str) -> Option<String>;
}

/// Loader backed by the local filesystem and the process environment
///
/// - `file:` paths are relative to [DefaultLoader::base_dir]
/// - `classpath:` paths are searched in each classpath root, first match wins
/// - `http:` is not supported
#[derive(Debug, Clone)]
pub struct DefaultLoader {
    base_dir: PathBuf,
    classpath: Vec<PathBuf>,
    system_properties: indexmap::IndexMap<String, String>,
}

impl DefaultLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let mut system_properties = indexmap::IndexMap::new();
        system_properties.insert("os.name".to_string(), std::env::consts::OS.to_string());
        system_properties.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
        system_properties.insert(
            "file.separator".to_string(),
            std::path::MAIN_SEPARATOR.to_string(),
        );
        system_properties.insert("line.separator".to_string(), "\n".to_string());
        system_properties.insert(
            "user.dir".to_string(),
            base_dir.display().to_string(),
        );
        if let Some(home) = std::env::var_os("HOME") {
            system_properties.insert(
                "user.home".to_string(),
                home.to_string_lossy().into_owned(),
            );
        }

        Self {
            base_dir,
            classpath: Vec::new(),
            system_properties,
        }
    }

    /// Loader rooted at the current work directory
    pub fn from_current_dir() -> Result<Self, std::io::Error> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn with_classpath_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.classpath.push(root.into());
        self
    }

    pub fn set_system_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.system_properties.insert(key.into(), value.into());
    }

    fn read(&self, locator: &str, path: &Path) -> Result<String, LoadError> {
        tracing::info!(path=%path.display(), "loading include");
        std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound {
                    locator: locator.to_string(),
                }
            } else {
                LoadError::Io {
                    locator: locator.to_string(),
                    source,
                }
            }
        })
    }
}

impl ResourceLoader for DefaultLoader {
    fn fetch(&self, scheme: Scheme, locator: &str) -> Result<String, LoadError> {
        let relative = strip_authority(locator);
        match scheme {
            Scheme::File => self.read(locator, &self.base_dir.join(relative)),
            Scheme::Classpath => {
                let relative = relative.trim_start_matches('/');
                let Some(path) = self
                    .classpath
                    .iter()
                    .map(|root| root.join(relative))
                    .find(|candidate| candidate.is_file())
                else {
                    return Err(LoadError::NotFound {
                        locator: locator.to_string(),
                    });
                };
                self.read(locator, &path)
            }
            Scheme::Http => Err(LoadError::UnsupportedScheme {
                scheme,
                locator: locator.to_string(),
            }),
        }
    }

    fn lookup_env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn lookup_system_property(&self, name: &str) -> Option<String> {
        self.system_properties.get(name).cloned()
    }
}

/// `//a/b` and `a/b` name the same resource
fn strip_authority(locator: &str) -> &str {
    locator.strip_prefix("//").unwrap_or(locator)
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("unable to read {locator}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },
    #[error("resource not found: {locator}")]
    NotFound { locator: String },
    #[error("scheme {scheme} is not supported (requested {locator})")]
    UnsupportedScheme { scheme: Scheme, locator: String },
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// In-memory loader for tests
    #[derive(Default, Debug)]
    pub(crate) struct MemoryLoader {
        pub(crate) resources: indexmap::IndexMap<(&'static str, &'static str), &'static str>,
        pub(crate) env: indexmap::IndexMap<&'static str, &'static str>,
        pub(crate) sys: indexmap::IndexMap<&'static str, &'static str>,
    }

    impl MemoryLoader {
        pub(crate) fn resource(
            mut self,
            scheme: &'static str,
            locator: &'static str,
            text: &'static str,
        ) -> Self {
            self.resources.insert((scheme, locator), text);
            self
        }

        pub(crate) fn env(mut self, name: &'static str, value: &'static str) -> Self {
            self.env.insert(name, value);
            self
        }

        pub(crate) fn sys(mut self, name: &'static str, value: &'static str) -> Self {
            self.sys.insert(name, value);
            self
        }
    }

    impl ResourceLoader for MemoryLoader {
        fn fetch(&self, scheme: Scheme, locator: &str) -> Result<String, LoadError> {
            self.resources
                .iter()
                .find(|((s, l), _)| *s == scheme.prefix() && *l == locator)
                .map(|(_, text)| text.to_string())
                .ok_or_else(|| LoadError::NotFound {
                    locator: locator.to_string(),
                })
        }

        fn lookup_env(&self, name: &str) -> Option<String> {
            self.env.get(name).map(|v| v.to_string())
        }

        fn lookup_system_property(&self, name: &str) -> Option<String> {
            self.sys.get(name).map(|v| v.to_string())
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hprops-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn scheme_prefixes() {
        assert_eq!(Scheme::from_prefix("file"), Some(Scheme::File));
        assert_eq!(Scheme::from_prefix("classpath"), Some(Scheme::Classpath));
        assert_eq!(Scheme::from_prefix("http"), Some(Scheme::Http));
        assert_eq!(Scheme::from_prefix("ftp"), None);
    }

    #[test]
    fn file_relative_to_base_dir() {
        let dir = temp_dir("file");
        std::fs::write(dir.join("inc.txt"), "included").unwrap();

        let loader = DefaultLoader::new(&dir);
        assert_eq!(loader.fetch(Scheme::File, "inc.txt").unwrap(), "included");
        assert_eq!(loader.fetch(Scheme::File, "//inc.txt").unwrap(), "included");
    }

    #[test]
    fn classpath_first_root_wins() {
        let first = temp_dir("cp-first");
        let second = temp_dir("cp-second");
        std::fs::write(second.join("only_second.txt"), "second").unwrap();
        std::fs::write(first.join("both.txt"), "first").unwrap();
        std::fs::write(second.join("both.txt"), "second").unwrap();

        let loader = DefaultLoader::new(".")
            .with_classpath_root(&first)
            .with_classpath_root(&second);

        assert_eq!(loader.fetch(Scheme::Classpath, "both.txt").unwrap(), "first");
        assert_eq!(
            loader.fetch(Scheme::Classpath, "only_second.txt").unwrap(),
            "second"
        );
        assert!(matches!(
            loader.fetch(Scheme::Classpath, "missing.txt"),
            Err(LoadError::NotFound { .. })
        ));
    }

    #[test]
    fn http_is_unsupported() {
        let loader = DefaultLoader::new(".");
        assert!(matches!(
            loader.fetch(Scheme::Http, "//example.com/a.txt"),
            Err(LoadError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn system_properties() {
        let mut loader = DefaultLoader::new("/some/dir");
        loader.set_system_property("app.mode", "test");

        assert_eq!(
            loader.lookup_system_property("app.mode").as_deref(),
            Some("test")
        );
        assert_eq!(
            loader.lookup_system_property("os.name").as_deref(),
            Some(std::env::consts::OS)
        );
        assert_eq!(loader.lookup_system_property("nope"), None);
    }
}
