use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use dotenvy::dotenv;
use serde_json::json;
use tracing::{error, info};

mod character;
mod config;
mod diffusion;
mod error;
mod style;
mod utils;

use character::{Age, Gender};
use config::CONFIG;
use diffusion::{DataUri, DiffusionClient};
use style::{StylePreset, StyleRegistry};
use utils::logging::init_logging;

#[derive(Debug)]
struct GenerateArgs {
    presets: Vec<String>,
    gender: Gender,
    age: Age,
    image: PathBuf,
    out_dir: PathBuf,
    dry_run: bool,
}

#[derive(Debug)]
enum Command {
    Presets,
    Personas,
    Generate(GenerateArgs),
}

fn usage() -> &'static str {
    "Usage:\n  style_request_compositor presets\n  style_request_compositor personas\n  style_request_compositor generate --preset <name[,name...]> --gender <female|couple|friends|male> --age <young|middle|old> --image <path> [--out <dir>] [--dry-run]"
}

fn parse_generate_args(args: &[String], default_out_dir: &Path) -> Result<GenerateArgs> {
    let mut presets = Vec::new();
    let mut gender: Option<Gender> = None;
    let mut age: Option<Age> = None;
    let mut image: Option<PathBuf> = None;
    let mut out_dir = default_out_dir.to_path_buf();
    let mut dry_run = false;

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--preset" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --preset"))?;
                presets.extend(
                    value
                        .split(',')
                        .map(|name| name.trim().to_string())
                        .filter(|name| !name.is_empty()),
                );
            }
            "--gender" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --gender"))?;
                gender = Some(value.parse()?);
            }
            "--age" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --age"))?;
                age = Some(value.parse()?);
            }
            "--image" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --image"))?;
                image = Some(PathBuf::from(value));
            }
            "--out" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --out"))?;
                out_dir = PathBuf::from(value);
            }
            "--dry-run" => {
                dry_run = true;
            }
            "--help" | "-h" => {
                return Err(anyhow!(usage()));
            }
            other => {
                return Err(anyhow!("Unknown generate argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    if presets.is_empty() {
        return Err(anyhow!("--preset is required"));
    }

    Ok(GenerateArgs {
        presets,
        gender: gender.ok_or_else(|| anyhow!("--gender is required"))?,
        age: age.ok_or_else(|| anyhow!("--age is required"))?,
        image: image.ok_or_else(|| anyhow!("--image is required"))?,
        out_dir,
        dry_run,
    })
}

fn parse_command(args: &[String], default_out_dir: &Path) -> Result<Command> {
    match args.get(1).map(|value| value.as_str()) {
        Some("presets") => Ok(Command::Presets),
        Some("personas") => Ok(Command::Personas),
        Some("generate") => Ok(Command::Generate(parse_generate_args(
            &args[2..],
            default_out_dir,
        )?)),
        Some(other) => Err(anyhow!("Unknown command: {other}\n{}", usage())),
        None => Err(anyhow!(usage())),
    }
}

fn list_presets(registry: &StyleRegistry) {
    for preset in registry.iter() {
        println!(
            "{:<16} {:<18} {}",
            preset.name(),
            preset.label(),
            preset.icon()
        );
    }
}

fn list_personas(registry: &StyleRegistry) {
    for persona in registry.personas().iter() {
        println!("{}", persona.name());
        for gender in Gender::ALL {
            let phrases: Vec<&str> = Age::ALL
                .into_iter()
                .map(|age| persona.lookup(gender, age))
                .collect();
            println!("  {:<8} {}", gender, phrases.join(" | "));
        }
    }
}

fn read_reference_image(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read reference image {}", path.display()))?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

fn print_dry_run(preset: &StylePreset, image: &str, gender: Gender, age: Age) -> Result<()> {
    let request = preset.render(image, gender, age)?;
    let mut payload = request.payload();
    payload["init_images"] = json!([format!("<{} base64 chars>", image.len())]);
    println!("# {} ({})", preset.name(), preset.label());
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn write_images(out_dir: &Path, preset: &str, images: &[DataUri]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    let mut written = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let path = out_dir.join(format!("{preset}-{}.png", index + 1));
        fs::write(&path, image.decode_bytes()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

async fn run_generate(registry: &StyleRegistry, args: GenerateArgs) -> Result<()> {
    // resolve everything up front so a typo fails before any request is sent
    let presets = match args
        .presets
        .iter()
        .map(|name| registry.resolve(name).cloned())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(presets) => presets,
        Err(err) if err.is_user_correctable() => {
            let known: Vec<&str> = registry.iter().map(|preset| preset.name()).collect();
            return Err(anyhow!("{err}; available presets: {}", known.join(", ")));
        }
        Err(err) => return Err(err.into()),
    };
    let image = read_reference_image(&args.image)?;

    if args.dry_run {
        for preset in &presets {
            print_dry_run(preset, &image, args.gender, args.age)?;
        }
        return Ok(());
    }

    let client = DiffusionClient::from_config(&CONFIG)?;
    info!(
        "Submitting {} preset(s) to {} for ({}, {})",
        presets.len(),
        client.endpoint(),
        args.gender,
        args.age
    );

    let mut tasks = Vec::with_capacity(presets.len());
    for preset in presets {
        let client = client.clone();
        let image = image.clone();
        let (gender, age) = (args.gender, args.age);
        tasks.push(tokio::spawn(async move {
            let result = preset.generate(&client, &image, gender, age).await;
            (preset, result)
        }));
    }

    let mut failures = 0;
    for task in tasks {
        let (preset, result) = task.await?;
        match result {
            Ok(images) => {
                let written = write_images(&args.out_dir, preset.name(), &images)?;
                for path in written {
                    println!("{}", path.display());
                }
            }
            Err(err) => {
                failures += 1;
                error!("Preset '{}' failed: {err}", preset.name());
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!("{failures} preset(s) failed"));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG);

    let args: Vec<String> = std::env::args().collect();
    let command = parse_command(&args, &CONFIG.output_dir)?;
    let registry = StyleRegistry::from_config(&CONFIG)?;

    match command {
        Command::Presets => list_presets(&registry),
        Command::Personas => list_personas(&registry),
        Command::Generate(generate) => run_generate(&registry, generate).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn parses_generate_with_multiple_presets() {
        let command = parse_command(&argv(&[
            "bin", "generate", "--preset", "retro, ghibli", "--gender", "Couple", "--age",
            "old", "--image", "me.png", "--out", "shots", "--dry-run",
        ]), Path::new("outputs"))
        .unwrap();
        let Command::Generate(args) = command else {
            panic!("expected generate");
        };
        assert_eq!(args.presets, ["retro", "ghibli"]);
        assert_eq!(args.gender, Gender::Couple);
        assert_eq!(args.age, Age::Old);
        assert_eq!(args.image, PathBuf::from("me.png"));
        assert_eq!(args.out_dir, PathBuf::from("shots"));
        assert!(args.dry_run);
    }

    #[test]
    fn rejects_values_outside_the_categories() {
        let err = parse_command(&argv(&[
            "bin", "generate", "--preset", "retro", "--gender", "robot", "--age", "old",
            "--image", "me.png",
        ]), Path::new("outputs"))
        .unwrap_err();
        assert!(err.to_string().contains("unknown gender"));
    }

    #[test]
    fn output_dir_defaults_to_configured_one() {
        let command = parse_command(&argv(&[
            "bin", "generate", "--preset", "retro", "--gender", "0", "--age", "1",
            "--image", "me.png",
        ]), Path::new("renders"))
        .unwrap();
        let Command::Generate(args) = command else {
            panic!("expected generate");
        };
        assert_eq!(args.out_dir, PathBuf::from("renders"));
        assert_eq!(args.gender, Gender::Female);
        assert_eq!(args.age, Age::Middle);
        assert!(!args.dry_run);
    }

    #[test]
    fn requires_a_preset() {
        let err = parse_command(&argv(&[
            "bin", "generate", "--gender", "male", "--age", "old", "--image", "me.png",
        ]), Path::new("outputs"))
        .unwrap_err();
        assert!(err.to_string().contains("--preset"));
    }

    #[test]
    fn written_images_match_decoded_bytes() {
        let dir = std::env::temp_dir().join(format!("stylizer-test-{}", std::process::id()));
        let images = vec![DataUri::from_base64("aGVsbG8=")];
        let written = write_images(&dir, "retro", &images).unwrap();
        assert_eq!(written, [dir.join("retro-1.png")]);
        assert_eq!(fs::read(&written[0]).unwrap(), b"hello");
        fs::remove_dir_all(&dir).ok();
    }
}
