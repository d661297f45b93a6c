use roda_server::config::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    let _server = roda_server::startup(&config)?;

    log::info!("roda server running, press Ctrl+C to stop");
    loop {
        std::thread::park();
    }
}
