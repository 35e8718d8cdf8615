use anyhow::Context;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::path::Path;
use tokio::runtime::Runtime;

mod args;
mod config;
mod images;
mod plan;
mod registry;
mod tags;
use crate::args::process_image_args;
use crate::config::MirrorConfig;
use crate::images::{target_image, Image};
use crate::plan::MirrorPlan;
use crate::registry::find_missing_images;

const DEFAULT_CONFIG: &str = "mirror.toml";

fn config_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("config")
        .long("config")
        .short("c")
        .takes_value(true)
        .default_value(DEFAULT_CONFIG)
}

fn images_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("images")
        .index(1)
        .multiple(true)
        .help("Extra images as name=registry/name:tag")
}

fn load_config(m: &ArgMatches<'_>) -> anyhow::Result<MirrorConfig> {
    let path = m.value_of("config").unwrap_or(DEFAULT_CONFIG);
    let mut config = MirrorConfig::load(path).with_context(|| format!("loading {}", path))?;
    config.add_images(process_image_args(m.values_of("images"))?)?;
    Ok(config)
}

fn plan(m: &ArgMatches<'_>) -> anyhow::Result<()> {
    let config = load_config(m)?;
    let plan = MirrorPlan::build(&config, m.value_of("registry"))?;
    match m.value_of("format") {
        Some("env") => {
            for image in &plan.images {
                println!("# {}", image.command.resource_name);
                print!("{}", image.command.to_env_lines());
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&plan)?),
    }
    Ok(())
}

fn check_sources(m: &ArgMatches<'_>) -> anyhow::Result<()> {
    let config = load_config(m)?;
    let docker_config = m
        .value_of("docker-config")
        .map(|p| shellexpand::tilde(p).into_owned());
    let mut images = Vec::with_capacity(config.images.len());
    for (name, entry) in &config.images {
        images.push((name.clone(), Image::parse(entry.source())?));
    }

    let mut runtime = Runtime::new()?;
    let missing = runtime
        .block_on(async { find_missing_images(docker_config.as_deref().map(Path::new), images).await })?;
    if !missing.is_empty() {
        anyhow::bail!("Source images not found: {}", missing.join(", "));
    }
    log::info!("All {} source images found", config.images.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let matches = App::new("ECR Image Mirror")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("resolve")
                .about("Derive the target reference of a source image")
                .arg(Arg::with_name("source").index(1).required(true))
                .arg(Arg::with_name("target-repository").index(2).required(true)),
        )
        .subcommand(
            SubCommand::with_name("plan")
                .about("Print the repositories and copy commands to provision")
                .arg(config_arg())
                .arg(
                    Arg::with_name("registry")
                        .long("registry")
                        .short("r")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("format")
                        .long("format")
                        .short("f")
                        .takes_value(true)
                        .possible_values(&["json", "env"])
                        .default_value("json"),
                )
                .arg(images_arg()),
        )
        .subcommand(
            SubCommand::with_name("check-sources")
                .about("Check every source image tag exists in its registry")
                .arg(config_arg())
                .arg(
                    Arg::with_name("docker-config")
                        .short("d")
                        .takes_value(true)
                        .required(false),
                )
                .arg(images_arg()),
        )
        .get_matches();
    match matches.subcommand() {
        ("resolve", Some(m)) => {
            let source = m.value_of("source").unwrap_or_default();
            let target = m.value_of("target-repository").unwrap_or_default();
            print!("{}", target_image(source, target)?);
            Ok(())
        }
        ("plan", Some(m)) => plan(m),
        ("check-sources", Some(m)) => check_sources(m),
        (other, _) => anyhow::bail!("Unknown subcommand {}", other),
    }
}
