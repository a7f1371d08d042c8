mod cli;

use anyhow::Context as _;
use hprops::resource::DefaultLoader;
use hprops::{LoadOptions, Properties};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("HPROPS_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Preprocess(file_cli) => preprocess(&cli.load, file_cli),
        cli::Command::Dump(dump_cli) => dump(&cli.load, dump_cli),
        cli::Command::Get(get_cli) => get(&cli.load, get_cli),
        cli::Command::Watch(watch_cli) => watch(&cli.load, watch_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn loader(args: &cli::LoadArgs) -> anyhow::Result<DefaultLoader> {
    let mut loader = DefaultLoader::from_current_dir()?;
    for root in &args.classpath {
        loader = loader.with_classpath_root(root);
    }
    for (key, value) in &args.system_properties {
        loader.set_system_property(key, value);
    }
    Ok(loader)
}

fn options(args: &cli::LoadArgs) -> LoadOptions {
    LoadOptions::new(!args.no_preprocess, !args.no_dereference)
}

pub fn preprocess(load: &cli::LoadArgs, cli: cli::FileArgs) -> anyhow::Result<()> {
    let loader = loader(load)?;
    let input = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("unable to read {}", cli.file.display()))?;

    print!("{}", hprops::preprocess::preprocess(&input, &loader)?);
    Ok(())
}

pub fn dump(load: &cli::LoadArgs, cli: cli::DumpCommand) -> anyhow::Result<()> {
    let tree = hprops::from_path(&cli.input.file, &loader(load)?, &options(load))?;
    output(&cli.output, &tree)
}

pub fn get(load: &cli::LoadArgs, cli: cli::GetCommand) -> anyhow::Result<()> {
    use cli::ValueType::*;

    let tree = hprops::from_path(&cli.input.file, &loader(load)?, &options(load))?;
    let Some(node) = tree.node(&cli.node) else {
        anyhow::bail!("node {} not found", cli.node);
    };
    anyhow::ensure!(
        node.property(&cli.key).is_some(),
        "property {} not found in {}",
        cli.key,
        node.hierarchical_name()
    );

    let value = match cli.value_type {
        String => node.property(&cli.key).map(str::to_string),
        Int => node.property_as_int(&cli.key).map(|v| v.to_string()),
        Double => node.property_as_double(&cli.key).map(|v| v.to_string()),
        Bool => node.property_as_bool(&cli.key).map(|v| v.to_string()),
    };
    let Some(value) = value else {
        anyhow::bail!("{} is not a valid {}", cli.key, cli.value_type);
    };

    println!("{value}");
    Ok(())
}

pub fn watch(load: &cli::LoadArgs, cli: cli::WatchCommand) -> anyhow::Result<()> {
    let interval = std::time::Duration::from_millis(cli.interval_ms);
    let reloader =
        hprops::reload::Reloader::start(&cli.input.file, loader(load)?, options(load), interval)?;
    let shared = reloader.properties();

    let mut current = shared.load();
    output(&cli.output, &current)?;
    loop {
        std::thread::sleep(interval);
        let latest = shared.load();
        if !std::sync::Arc::ptr_eq(&current, &latest) {
            println!();
            output(&cli.output, &latest)?;
            current = latest;
        }
    }
}

fn output(output: &cli::OutputArgs, tree: &Properties) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), tree)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), tree)?;
            println!();
        }
        cli::OutputFormat::Text => print!("{}", hprops::serializer::to_string(tree)),
    };

    Ok(())
}
