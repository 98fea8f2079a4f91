use std::path::PathBuf;
use std::process::Command;

use anyhow::Result;
use clap::{Parser, Subcommand};
use swapup_core::image::{CoreId, ImageHeader, ImageVersion};
use swapup_core::package::PackageBuilder;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the CLI
    Run,
    /// Write a synthetic two-image package for manual testing
    MakePackage {
        /// Output path
        #[arg(default_value = "demo.swpk")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            let status = Command::new("cargo").arg("build").status()?;
            if !status.success() {
                anyhow::bail!("Build failed");
            }
        }
        Commands::Run => {
            println!("Running CLI...");
            let status = Command::new("cargo")
                .arg("run")
                .arg("-p")
                .arg("swapup-cli")
                .status()?;
            if !status.success() {
                anyhow::bail!("Run failed");
            }
        }
        Commands::MakePackage { out } => {
            let raw = PackageBuilder::new()
                .image(CoreId::App, image_content(4096, ImageVersion::new(1, 2, 3)))
                .image(CoreId::Net, image_content(2048, ImageVersion::new(1, 0, 9)))
                .build();
            std::fs::write(out, &raw)?;
            println!("Wrote {} ({} bytes)", out.display(), raw.len());
        }
    }

    Ok(())
}

fn image_content(payload_len: usize, version: ImageVersion) -> Vec<u8> {
    let mut content = ImageHeader::new(payload_len as u32, version).to_bytes();
    content.extend((0..payload_len).map(|i| (i % 251) as u8));
    content
}
