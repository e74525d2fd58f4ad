// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use gridloop::config::EngineConfig;
use gridloop::storage::DirectoryStorage;
use gridloop::{encode, host};
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=grid loop sampler

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/gridloop
ExecStart=/usr/local/bin/gridloop start "$GRIDLOOP_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=gridloop.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A grid loop sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input/output devices.
    MidiDevices {},
    /// Encodes a WAV file into the storage directory.
    Encode {
        /// The WAV file to encode.
        wav_path: String,
        /// The storage directory to write into.
        out_dir: String,
        /// The 8.3 name of the result. Stereo files get L and R suffixes.
        name: String,
    },
    /// Start will start the engine with a console for commands.
    Start {
        /// The path to the engine config.
        config_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = host::audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let ports = host::midi::list_ports()?;

            if ports.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for port in ports {
                println!("- {}", port);
            }
        }
        Commands::Encode {
            wav_path,
            out_dir,
            name,
        } => {
            let mut storage = DirectoryStorage::open(&PathBuf::from(&out_dir))?;
            for entry in encode::encode_wav(&PathBuf::from(wav_path), &mut storage, &name)? {
                println!("- {} ({} bytes)", entry.display_name(), entry.size_bytes);
            }
        }
        Commands::Start { config_path } => {
            let config = EngineConfig::deserialize(&PathBuf::from(config_path))?;
            host::run(&config)?;
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
