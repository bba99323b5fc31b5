//! `cannonade init` command implementation.

use anyhow::Result;
use std::path::Path;

/// Execute the `init` command.
///
/// Creates `cannonade.toml` in the current directory. Refuses to overwrite an
/// existing file unless `force` is set.
pub fn execute_init(force: bool) -> Result<()> {
    let config_path = std::env::current_dir()?.join("cannonade.toml");
    write_template(&config_path, force)?;
    eprintln!("Created {}", config_path.display());
    eprintln!("Edit the file to customize your schedule and payload.");
    Ok(())
}

fn write_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            path.display()
        );
    }
    std::fs::write(path, generate_default_template())?;
    Ok(())
}

/// Starter config with every section spelled out.
fn generate_default_template() -> String {
    r#"# cannonade configuration
#
# Run with: cannonade run http://localhost:8080/predict

[settings]
# Concurrency and request count of the single default stage.
# Ignored when [[stage]] blocks are present.
num_clients = 8
num_requests = 100
# Per-request timeout in seconds (fractions allowed).
timeout_secs = 60.0
# apikey = "..."

[payload]
# JPEG to shoot with. Each request carries it base64-encoded as {"image": "..."}.
image = "example.jpg"
# Use a static JSON body instead of an image:
# body = '{"ping": true}'
# Scatter fresh random gray pixels over the image for every request.
regenerate = true
noise_iterations = 100
jpeg_quality = 95

# Stages run one after another. Uncomment to ramp the load.
# [[stage]]
# requests = 20
# concurrency = 2
#
# [[stage]]
# requests = 100
# concurrency = 10
"#
    .to_string()
}
