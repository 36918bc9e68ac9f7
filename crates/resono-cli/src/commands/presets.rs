//! Instrument and bindings preset commands.

use clap::{Args, Subcommand};
use resono_config::paths::file_name_for;
use resono_config::{
    PresetSource, all_bindings, all_instruments, bindings_dir, ensure_bindings_dir,
    ensure_instruments_dir, instruments_dir, options_path, recordings_dir,
};

use super::common::{load_bindings, load_instrument};

#[derive(Args)]
pub struct PresetsArgs {
    #[command(subcommand)]
    command: Option<PresetsCommand>,
}

#[derive(Subcommand)]
enum PresetsCommand {
    /// List instruments and bindings (factory and user)
    List {
        /// Show only factory presets
        #[arg(long)]
        factory: bool,

        /// Show only user presets
        #[arg(long)]
        user: bool,
    },

    /// Print a preset as JSON
    Show {
        /// Preset name or path
        name: String,

        /// Look up a bindings set instead of an instrument
        #[arg(long)]
        bindings: bool,
    },

    /// Copy a preset into the user directory for editing
    Copy {
        /// Preset name or path
        source: String,

        /// New preset name (defaults to the source name)
        #[arg(short, long)]
        name: Option<String>,

        /// Copy a bindings set instead of an instrument
        #[arg(long)]
        bindings: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show preset, options and recording locations
    Paths,
}

pub fn run(args: PresetsArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(PresetsCommand::List {
        factory: false,
        user: false,
    }) {
        PresetsCommand::List { factory, user } => list(factory, user),
        PresetsCommand::Show { name, bindings } => {
            let json = if bindings {
                load_bindings(&name)?.to_json()?
            } else {
                load_instrument(&name)?.to_json()?
            };
            println!("{json}");
            Ok(())
        }
        PresetsCommand::Copy {
            source,
            name,
            bindings,
            force,
        } => copy(&source, name, bindings, force),
        PresetsCommand::Paths => {
            println!("Instruments: {}", instruments_dir().display());
            println!("Bindings:    {}", bindings_dir().display());
            println!("Options:     {}", options_path().display());
            println!("Recordings:  {}", recordings_dir().display());
            Ok(())
        }
    }
}

fn list(factory_only: bool, user_only: bool) -> anyhow::Result<()> {
    let show = |source: &PresetSource| match source {
        PresetSource::Factory => !user_only,
        PresetSource::User(_) => !factory_only,
    };
    let origin = |source: &PresetSource| match source {
        PresetSource::Factory => "factory".to_string(),
        PresetSource::User(path) => path.display().to_string(),
    };

    println!("Instruments");
    println!("===========\n");
    for listed in all_instruments(&instruments_dir())
        .iter()
        .filter(|l| show(&l.source))
    {
        let preset = &listed.preset;
        println!(
            "  {:<20} {:>2} osc, {} voices  [{}]",
            preset.name,
            preset.synth.oscillators.len(),
            preset.polyphony,
            origin(&listed.source)
        );
    }

    println!();
    println!("Bindings");
    println!("========\n");
    for listed in all_bindings(&bindings_dir())
        .iter()
        .filter(|l| show(&l.source))
    {
        let preset = &listed.preset;
        let kind = if preset.controller_type.is_empty() {
            "any"
        } else {
            preset.controller_type.as_str()
        };
        println!(
            "  {:<20} {:>3} binds, {}  [{}]",
            preset.name,
            preset.binds.len(),
            kind,
            origin(&listed.source)
        );
    }
    Ok(())
}

fn copy(source: &str, name: Option<String>, bindings: bool, force: bool) -> anyhow::Result<()> {
    let path = if bindings {
        let mut preset = load_bindings(source)?;
        if let Some(name) = name {
            preset.name = name;
        }
        preset.locked = false;
        let path = ensure_bindings_dir()?.join(file_name_for(&preset.name));
        if path.exists() && !force {
            anyhow::bail!("{} exists; pass --force to overwrite", path.display());
        }
        preset.save(&path)?;
        path
    } else {
        let mut preset = load_instrument(source)?;
        if let Some(name) = name {
            preset.name = name;
        }
        let path = ensure_instruments_dir()?.join(file_name_for(&preset.name));
        if path.exists() && !force {
            anyhow::bail!("{} exists; pass --force to overwrite", path.display());
        }
        preset.save(&path)?;
        path
    };
    println!("Saved {}", path.display());
    Ok(())
}
