//! # hprops - hierarchical properties
//!
//! Configuration files made of `key = value` lines grouped under `[/path]` categories, with a directive
//! preprocessor in front and cross references between nodes.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `hprops` works internally.
//!
//! ### Document example
//!
//! ```text
//! !<def:env=prod>
//! # line comments work like this
//! // ...or like this
//!
//! /* multi-line
//! comments
//! also work */
//! name = demo
//!
//! [ /server ]
//! host = example.org
//! !<if:env==prod>
//! port = 443
//! !<else>
//! port = 8080
//! !<endif>
//!
//! !<for i = 1 : 3>
//! [ /server/worker!<$i> ]
//! id = !<$i>
//! !<endfor>
//!
//! [ /client ]
//! url = https://${/server:host}:${/server:port}
//! home = ${ENV.HOME}
//! ```
//!
//! ### Pipeline
//!
//! | step              | module                | input                  | output                          |
//! |-------------------|-----------------------|------------------------|---------------------------------|
//! | preprocess        | [preprocess]          | raw text               | expanded text                   |
//! | parse             | [parser]              | expanded text          | [tree::Properties] + references |
//! | dereference       | [resolve]             | tree + references      | tree without placeholders       |
//!
//! [factory] wires the steps together, [factory::LoadOptions] turns the first and the last one off.
//!
//! ### Preprocessing
//!
//! see [preprocess::preprocess]
//!
//! The preprocessor knows nothing about properties. It splits the text into literal runs and `!<...>` directives
//! ([preprocess::directive]), decides conditionals while reading and builds a small syntax tree of what survived
//! ([preprocess::ast]). Producing that tree expands loops, variables and includes.
//!
//! Includes and `ENV.`/`SYS.` lookups go through a [resource::ResourceLoader].
//!
//! ### Parsing
//!
//! see [parser::parse]
//!
//! A cursor points at the node that receives properties and comments. A category header walks from the root,
//! creating missing nodes, and moves the cursor. `${ENV.X}`/`${SYS.X}` are substituted right away, `${path:key}`
//! placeholders are recorded as [resolve::Reference]s because their target may come later in the document.
//!
//! ### Dereferencing
//!
//! see [resolve::dereference]
//!
//! References are resolved once, in the order they were found, after the whole document is in the tree.
//!
//! ### Output
//!
//! - [tree::NodeRef] has typed accessors (`property_as_int`, ...)
//! - [serializer] writes the tree back in the same format
//! - the tree implements [serde::Serialize] for JSON/YAML dumps
//! - [reload::Reloader] keeps a tree in sync with its file
//!
pub mod factory;
pub mod parser;
pub mod preprocess;
pub mod reload;
pub mod resolve;
pub mod resource;
pub mod serializer;
pub mod tree;
mod util;

pub use factory::{from_classpath, from_path, from_str, Error, LoadOptions};
pub use tree::{NodeRef, Properties};
pub use util::Position;
