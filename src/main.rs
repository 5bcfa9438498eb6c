use micromodeler::{config::EditorConfig, logging::init_logging, EditorApp};

fn main() -> anyhow::Result<()> {
    let config = EditorConfig::from_env();
    init_logging(&config.logging);

    EditorApp::new(config)?.run()
}
