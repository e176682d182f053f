mod audio;
mod cache;
mod config;
mod download;
mod library;
mod queue;
mod runtime;
mod store;
mod walker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    runtime::run().await
}
