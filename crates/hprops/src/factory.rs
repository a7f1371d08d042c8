//! build a tree from text, a file or a classpath resource
//!
//! The pipeline runs the preprocessor, parses the expanded text and resolves references. The first and last step
//! can be switched off with [LoadOptions].
use crate::parser::{self, ParseErrors};
use crate::preprocess::{self, PreprocessError};
use crate::resolve::{self, ResolveError};
use crate::resource::{LoadError, ResourceLoader, Scheme};
use crate::tree::Properties;
use std::path::Path;

#[derive(derive_new::new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// expand `!<...>` directives first
    pub preprocess: bool,
    /// resolve `${path:key}` placeholders
    pub dereference: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn from_str(
    input: &str,
    loader: &dyn ResourceLoader,
    options: &LoadOptions,
) -> Result<Properties, Error> {
    let expanded;
    let text = if options.preprocess {
        expanded = preprocess::preprocess(input, loader)?;
        expanded.as_str()
    } else {
        input
    };

    let parser::Parsed {
        mut properties,
        references,
    } = parser::parse(text, loader)?;

    if options.dereference {
        resolve::dereference(&mut properties, &references)?;
    }

    Ok(properties)
}

#[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn from_path(
    path: &Path,
    loader: &dyn ResourceLoader,
    options: &LoadOptions,
) -> Result<Properties, Error> {
    tracing::info!(path=%path.display(), "loading properties");
    let input = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        locator: path.display().to_string(),
        source,
    })?;
    from_str(&input, loader, options)
}

#[tracing::instrument(level = "debug", skip(loader, options))]
pub fn from_classpath(
    locator: &str,
    loader: &dyn ResourceLoader,
    options: &LoadOptions,
) -> Result<Properties, Error> {
    let input = Scheme::Classpath.fetch(loader, locator)?;
    from_str(&input, loader, options)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("preprocessing failed")]
    Preprocess(#[from] PreprocessError),
    #[error("invalid properties")]
    Parse(#[from] ParseErrors),
    #[error("unable to resolve references")]
    Resolve(#[from] ResolveError),
}
