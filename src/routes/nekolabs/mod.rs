mod handler;
mod model;

pub use handler::{
    chat_completion, cors_proxy, generate_image, generate_text_gemini, generate_text_openai,
};
