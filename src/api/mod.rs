pub mod elevenlabs;
pub mod freepik;
pub mod gradio;
pub mod groq;
pub mod kokoro;
pub mod submagic;
pub mod wan;
pub mod youtube;
