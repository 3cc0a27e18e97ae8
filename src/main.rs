use clap::Parser;
use color_eyre::Result;
use stream_harvester::{
    init_errors,
    init_logging,
    App,
    Args,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;
    let app = App::new(Args::parse())?;
    init_logging(app.verbose())?;
    app.run().await
}
