mod clock;
mod commands;
mod config;
mod countdown;
mod database;
mod giveaway;
mod handlers;
mod init_tracing;
mod lifecycle;
mod types;
mod util;
mod watch2gether;

use std::env;

use color_eyre::{Result, eyre::Context as _};
use poise::{
    Framework, FrameworkOptions,
    builtins::{register_globally, register_in_guild},
    serenity_prelude::*,
};
use tracing::{info, warn};

use config::Config;
use handlers::error_handler;
use types::Data;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().wrap_err("failed to install color_eyre")?;
    // the token may come from the environment instead of a .env file
    _ = dotenvy::dotenv();
    init_tracing::init().wrap_err("failed to initialize tracing formatter")?;

    info!("Loading config...");
    let config = Config::load()?;

    info!("Connecting to the database...");
    let pool = database::connect(&config.database).await?;

    info!("Loading settings...");
    let data = Data::new(pool, config).await.wrap_err("failed to load data")?;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: commands::get(),
            on_error: |err| Box::pin(error_handler(err)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Registering commands...");
                let commands = &framework.options().commands;
                match data.config.guild {
                    Some(guild) => register_in_guild(ctx, commands, guild).await?,
                    None => {
                        warn!("No guild-id configured, registering commands globally");
                        register_globally(ctx, commands).await?
                    }
                }

                tokio::spawn(countdown::run(ctx.clone(), data.clone()));
                tokio::spawn(giveaway::run(ctx.clone(), data.clone()));
                tokio::spawn(clock::run(ctx.clone(), data.clone()));

                info!("Done!");

                Ok(data)
            })
        })
        .build();

    let token = env::var("DISCORD_TOKEN").wrap_err("environment variable DISCORD_TOKEN missing")?;
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_MEMBERS;

    let mut client = ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .wrap_err("failed to create client")?;

    info!("Starting the client...");

    client
        .start()
        .await
        .wrap_err("the client encountered an error")
}
