//! hprops cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; hprops ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[clap(flatten)]
    pub load: LoadArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug)]
pub struct LoadArgs {
    /// Directory searched by `!<classpath:...>` includes
    ///
    /// Can be specified multiple times, the first directory containing the resource wins.
    #[clap(
        long = "classpath",
        env = "HPROPS_CLASSPATH",
        value_delimiter = ':',
        global(true)
    )]
    pub classpath: Vec<PathBuf>,

    /// Set a system property for `SYS.` lookups (key=value)
    #[clap(short = 'D', value_parser = parse_key_value, global(true))]
    pub system_properties: Vec<(String, String)>,

    /// Read directives as plain text
    #[clap(long = "no-preprocess", global(true))]
    pub no_preprocess: bool,

    /// Leave `${path:key}` placeholders in place
    #[clap(long = "no-dereference", global(true))]
    pub no_dereference: bool,
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, found '{arg}'")),
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the document with all directives expanded
    #[command(alias = "pp")]
    Preprocess(FileArgs),

    /// Print the whole tree
    Dump(DumpCommand),

    /// Print a single property
    Get(GetCommand),

    /// Load a file and print the tree each time it changes
    Watch(WatchCommand),
}

#[derive(Parser, Debug)]
pub struct FileArgs {
    /// Document to load
    ///
    /// Relative paths and `!<file:...>` includes resolve against the work directory.
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct DumpCommand {
    #[clap(flatten)]
    pub input: FileArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct GetCommand {
    #[clap(flatten)]
    pub input: FileArgs,

    /// Hierarchical name of the node, e.g. /server/http
    pub node: String,

    pub key: String,

    /// Parse the value before printing it
    #[arg(short = 't', long = "type", default_value_t)]
    pub value_type: ValueType,
}

#[derive(Parser, Debug)]
pub struct WatchCommand {
    #[clap(flatten)]
    pub input: FileArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// How often the file is checked for changes
    #[arg(long = "interval-ms", default_value_t = 1000)]
    pub interval_ms: u64,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Default, Debug)]
pub enum OutputFormat {
    Json,
    Yaml,
    #[default]
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
            OutputFormat::Text => f.write_str("text"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Default, Debug)]
pub enum ValueType {
    #[default]
    String,
    Int,
    Double,
    Bool,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::String => f.write_str("string"),
            ValueType::Int => f.write_str("int"),
            ValueType::Double => f.write_str("double"),
            ValueType::Bool => f.write_str("bool"),
        }
    }
}
