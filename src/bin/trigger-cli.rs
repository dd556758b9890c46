use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trigger-cli")]
#[command(about = "Send play requests to a running play-trigger", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9900")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the trigger to play a media URL
    Play { media_url: String },
    /// Post an arbitrary body, as a camera or intercom would
    Send { body: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let body = match cli.command {
        Commands::Play { media_url } => media_url,
        Commands::Send { body } => body,
    };

    let res = client
        .post(format!("{}/play", cli.url.trim_end_matches('/')))
        .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body)
        .send()
        .await?;

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: trigger returned status {}", status);
        eprintln!("Response: {}", text);
        std::process::exit(1);
    }

    println!("{} {}", status.as_u16(), text);
    Ok(())
}
