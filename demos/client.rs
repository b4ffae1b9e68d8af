use argh::FromArgs;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 2000;

#[derive(FromArgs)]
/// Fitting room client for uploading photos and checking the server
struct ClientArgs {
    /// the host to connect to
    #[argh(option, default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "transform" or "health"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Transform(TransformCommand),
    Health(HealthCommand),
}

#[derive(FromArgs)]
/// Upload a photo, and optionally a dress, for a try-on
#[argh(subcommand, name = "transform")]
struct TransformCommand {
    /// the path to the subject photo
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the path to a reference dress photo
    #[argh(option, short = 'd')]
    dress_path: Option<PathBuf>,
}

#[derive(FromArgs)]
/// Check the server mode
#[argh(subcommand, name = "health")]
struct HealthCommand {}

async fn file_part(path: &Path) -> Result<Part, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime.as_ref())?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Transform(command) => {
            let mut form = Form::new().part("image", file_part(&command.image_path).await?);
            if let Some(dress_path) = &command.dress_path {
                form = form.part("dress", file_part(dress_path).await?);
            }

            let response = client
                .post(format!("http://{}/api/transform", addr))
                .multipart(form)
                .send()
                .await?;

            if !response.status().is_success() {
                println!("Error {}: {}", response.status(), response.text().await?);
                return Ok(());
            }

            let result = response.json::<fitting_room::TransformResult>().await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
            println!("Download: http://{}{}", addr, result.transformed_image_url);
        }
        ClientCommands::Health(_) => {
            let response = client
                .get(format!("http://{}/health", addr))
                .send()
                .await?;

            let result = response.json::<serde_json::Value>().await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
