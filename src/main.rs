//! Calliope CLI binary entry point.

use std::io::Write as _;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;

use calliope::audio::{SpeechRequest, SpeechSynthesizer, Transcriber, Voice};
use calliope::chat::{ChatClient, ChatRequest};
use calliope::cli::{
    mime_for_path, ChatArgs, Cli, Commands, DescribeArgs, EditArgs, ImagineArgs, SpeakArgs,
    TranscribeArgs, VideoArgs,
};
use calliope::config::CalliopeConfig;
use calliope::media::{AspectRatio, ImageEditRequest, ImageRequest, VideoRequest};
use calliope::types::{GenerationSettings, GroundingMetadata, ToolChoice};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("calliope=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // The credential gates everything; fail once, up front.
    let api_key = match CalliopeConfig::global().require_api_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let base_url = CalliopeConfig::global().base_url();

    let result = match cli.command {
        Commands::Chat(args) => handle_chat(api_key, base_url, args).await,
        Commands::Imagine(args) => handle_imagine(api_key, base_url, args).await,
        Commands::Edit(args) => handle_edit(api_key, base_url, args).await,
        Commands::Video(args) => handle_video(api_key, base_url, args).await,
        Commands::Speak(args) => handle_speak(api_key, base_url, args).await,
        Commands::Transcribe(args) => handle_transcribe(api_key, base_url, args).await,
        Commands::Describe(args) => handle_describe(api_key, base_url, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(api_key: String, base_url: String, args: ChatArgs) -> CliResult {
    let Some(prompt) = args.prompt else {
        eprintln!("Usage: calliope chat \"your prompt here\"");
        std::process::exit(1);
    };

    let mut client = ChatClient::new_with_base_url(api_key, base_url);
    if let Some(model) = args.model {
        client = client.with_model(model);
    }

    let mut tools = Vec::new();
    if args.search {
        tools.push(ToolChoice::WebSearch);
    }
    if let Some(maps) = args.maps {
        let (latitude, longitude) = parse_lat_lng(&maps)?;
        tools.push(ToolChoice::MapsGrounding {
            latitude: Some(latitude),
            longitude: Some(longitude),
        });
    }

    let request = ChatRequest {
        messages: vec![calliope::types::ModelMessage::user(prompt)],
        system_instruction: args.system,
        settings: GenerationSettings {
            temperature: args.temperature,
            max_output_tokens: args.max_tokens,
            thinking_budget: args.thinking,
            ..GenerationSettings::default()
        },
        tools,
    };

    if args.no_stream {
        let response = client.generate(&request).await?;
        println!("{}", response.text);
        print_citations(response.grounding.as_ref());
        return Ok(());
    }

    let mut stream = client.stream(&request).await?;
    let mut grounding = None;
    while let Some(delta) = stream.next().await {
        let delta = delta?;
        print!("{}", delta.text);
        std::io::stdout().flush()?;
        if delta.grounding.is_some() {
            grounding = delta.grounding;
        }
    }
    println!();
    print_citations(grounding.as_ref());
    Ok(())
}

fn print_citations(grounding: Option<&GroundingMetadata>) {
    let Some(grounding) = grounding else { return };
    if grounding.sources.is_empty() {
        return;
    }
    eprintln!("\nSources:");
    for source in &grounding.sources {
        match &source.title {
            Some(title) => eprintln!("  {} — {}", title, source.uri),
            None => eprintln!("  {}", source.uri),
        }
    }
}

fn parse_lat_lng(raw: &str) -> Result<(f64, f64), Box<dyn std::error::Error>> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or("--maps expects \"LAT,LNG\", e.g. 37.42,-122.08")?;
    Ok((lat.trim().parse()?, lng.trim().parse()?))
}

async fn handle_imagine(api_key: String, base_url: String, args: ImagineArgs) -> CliResult {
    let client = calliope::media::ImageClient::new_with_base_url(api_key, base_url);
    let request = ImageRequest {
        prompt: args.prompt,
        count: args.count,
        aspect_ratio: parse_aspect(args.aspect.as_deref())?,
    };

    let images = client.generate(&request).await?;
    std::fs::create_dir_all(&args.out)?;
    for (index, image) in images.iter().enumerate() {
        let path = args.out.join(format!(
            "image-{}.{}",
            index + 1,
            extension_for_mime(&image.mime_type)
        ));
        std::fs::write(&path, &image.bytes)?;
        println!("{}", path.display());
    }
    Ok(())
}

async fn handle_edit(api_key: String, base_url: String, args: EditArgs) -> CliResult {
    let client = calliope::media::ImageClient::new_with_base_url(api_key, base_url);
    let source = std::fs::read(&args.image)?;
    let request = ImageEditRequest {
        prompt: args.prompt,
        image: source,
        mime_type: mime_for_path(&args.image).to_string(),
    };

    let edited = client.edit(&request).await?;
    let out = args.out.unwrap_or_else(|| {
        args.image
            .with_file_name(format!("edited.{}", extension_for_mime(&edited.mime_type)))
    });
    std::fs::write(&out, &edited.bytes)?;
    println!("{}", out.display());
    if let Some(commentary) = edited.commentary {
        eprintln!("{commentary}");
    }
    Ok(())
}

async fn handle_video(api_key: String, base_url: String, args: VideoArgs) -> CliResult {
    let mut client = calliope::media::VideoClient::new_with_base_url(api_key, base_url);
    if let Some(secs) = args.poll_secs {
        client = client.with_poll_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = args.deadline_secs {
        client = client.with_poll_deadline(Duration::from_secs(secs));
    }

    let image = match &args.image {
        Some(path) => Some((std::fs::read(path)?, mime_for_path(path).to_string())),
        None => None,
    };
    let request = VideoRequest {
        prompt: args.prompt,
        image,
        aspect_ratio: parse_aspect(args.aspect.as_deref())?,
    };

    eprintln!("Submitting video job (this can take a few minutes)...");
    let asset = client.generate(&request).await?;
    let bytes = client.download(&asset).await?;
    std::fs::write(&args.out, bytes)?;
    println!("{}", args.out.display());
    Ok(())
}

async fn handle_speak(api_key: String, base_url: String, args: SpeakArgs) -> CliResult {
    let synthesizer = calliope::audio::GeminiSpeech::new_with_base_url(api_key, base_url);
    let request = SpeechRequest::new(args.text, Voice::named(args.voice));
    let audio = synthesizer.synthesize(&request).await?;

    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args.out, spec)?;
    for sample in audio.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    println!("{}", args.out.display());
    Ok(())
}

async fn handle_transcribe(api_key: String, base_url: String, args: TranscribeArgs) -> CliResult {
    let transcriber = calliope::audio::GeminiTranscriber::new_with_base_url(api_key, base_url);
    let audio = std::fs::read(&args.file)?;
    let result = transcriber
        .transcribe(&audio, mime_for_path(&args.file), args.language.as_deref())
        .await?;
    println!("{}", result.text);
    Ok(())
}

async fn handle_describe(api_key: String, base_url: String, args: DescribeArgs) -> CliResult {
    let upload_base_url = CalliopeConfig::global().upload_base_url();
    let files = calliope::analysis::FilesClient::new_with_base_urls(
        api_key.clone(),
        base_url.clone(),
        upload_base_url,
    );
    let analysis = calliope::analysis::AnalysisClient::new_with_base_url(api_key, base_url);

    let data = std::fs::read(&args.file)?;
    let display_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    eprintln!("Uploading and waiting for remote processing...");
    let file = files
        .upload_and_wait(data, mime_for_path(&args.file), &display_name)
        .await?;
    let answer = analysis.describe(&file, &args.prompt).await?;
    println!("{answer}");
    Ok(())
}

fn parse_aspect(raw: Option<&str>) -> Result<Option<AspectRatio>, Box<dyn std::error::Error>> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse::<AspectRatio>()
            .map(Some)
            .map_err(|_| format!("Unknown aspect ratio '{value}' (try 1:1, 16:9, 9:16)").into()),
    }
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}
