//! CLI surface: one subcommand per mode.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Calliope CLI
#[derive(Parser, Debug)]
#[command(name = "calliope", version, about = "Multimodal generative AI from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat with the model, optionally grounded in search or places
    Chat(ChatArgs),
    /// Generate images from a prompt
    Imagine(ImagineArgs),
    /// Edit an image with a text instruction
    Edit(EditArgs),
    /// Generate a video (long-running; polls until rendered)
    Video(VideoArgs),
    /// Synthesize speech to a WAV file
    Speak(SpeakArgs),
    /// Transcribe an audio file
    Transcribe(TranscribeArgs),
    /// Analyze an uploaded video or audio file
    Describe(DescribeArgs),
}

/// Arguments for `calliope chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Model override
    #[arg(short, long)]
    pub model: Option<String>,

    /// System instruction
    #[arg(short, long)]
    pub system: Option<String>,

    /// Ground the answer in web search
    #[arg(long)]
    pub search: bool,

    /// Ground the answer in places near "LAT,LNG"
    #[arg(long, value_name = "LAT,LNG")]
    pub maps: Option<String>,

    /// Extended-reasoning budget in tokens (0 disables reasoning)
    #[arg(long)]
    pub thinking: Option<u32>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max output tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Wait for the full response instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// User prompt (positional)
    pub prompt: Option<String>,
}

/// Arguments for `calliope imagine`.
#[derive(Parser, Debug)]
pub struct ImagineArgs {
    /// Number of images (1-4)
    #[arg(short, long, default_value_t = 1)]
    pub count: u32,

    /// Aspect ratio (1:1, 16:9, 9:16, 4:3, 3:4)
    #[arg(long)]
    pub aspect: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,

    /// Image prompt (positional)
    pub prompt: String,
}

/// Arguments for `calliope edit`.
#[derive(Parser, Debug)]
pub struct EditArgs {
    /// Source image file
    #[arg(short, long)]
    pub image: PathBuf,

    /// Output file (defaults next to the source)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Edit instruction (positional)
    pub prompt: String,
}

/// Arguments for `calliope video`.
#[derive(Parser, Debug)]
pub struct VideoArgs {
    /// Seed image file
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Aspect ratio (16:9, 9:16)
    #[arg(long)]
    pub aspect: Option<String>,

    /// Output file
    #[arg(short, long, default_value = "video.mp4")]
    pub out: PathBuf,

    /// Seconds between job polls
    #[arg(long)]
    pub poll_secs: Option<u64>,

    /// Give up after this many seconds (default: wait for the job)
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Video prompt (positional)
    pub prompt: Option<String>,
}

/// Arguments for `calliope speak`.
#[derive(Parser, Debug)]
pub struct SpeakArgs {
    /// Prebuilt voice name
    #[arg(short, long, default_value = "Kore")]
    pub voice: String,

    /// Output WAV file
    #[arg(short, long, default_value = "speech.wav")]
    pub out: PathBuf,

    /// Text to speak (positional)
    pub text: String,
}

/// Arguments for `calliope transcribe`.
#[derive(Parser, Debug)]
pub struct TranscribeArgs {
    /// Language hint, e.g. "en"
    #[arg(short, long)]
    pub language: Option<String>,

    /// Audio file (positional)
    pub file: PathBuf,
}

/// Arguments for `calliope describe`.
#[derive(Parser, Debug)]
pub struct DescribeArgs {
    /// Question to ask about the media
    #[arg(short, long, default_value = "Describe this video in detail.")]
    pub prompt: String,

    /// Video or audio file (positional)
    pub file: PathBuf,
}

/// Guess a MIME type from a file extension. The upload and transcription
/// endpoints both want one; unknown extensions fall back to octet-stream.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("aac") => "audio/aac",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("mp4") => "video/mp4",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
