mod commands;

use std::sync::Arc;

use log::*;

use nearby_bot::config::Config;
use nearby_bot::session::{SessionRegistry, Services};
use nearby_bot::GenericError;

use serenity::{
    async_trait,
    framework::StandardFramework,
    http::Http,
    model::prelude::Ready,
    prelude::{Client, Context, EventHandler, GatewayIntents},
};

use commands::{Registry, GENERAL_GROUP, HELP};

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
    }
}

#[tokio::main]
async fn main() -> Result<(), GenericError> {
    env_logger::builder()
        .filter_module("nearby_bot", log::LevelFilter::Trace)
        .parse_default_env()
        .init();
    trace!("Logger init with level TRACE.");

    let config = Config::from_env()?;
    let token = config
        .discord_token
        .clone()
        .ok_or("DISCORD_TOKEN not set.")?;
    let http = Http::new(&token);
    let bot_id = http.get_current_user().await?.id;

    let services = Services::from_config(&config)?;
    let registry = Arc::new(SessionRegistry::new(services));

    let framework = StandardFramework::new()
        .configure(|c| {
            c.with_whitespace(true)
                .on_mention(Some(bot_id))
                .prefix(config.prefix.as_str())
        })
        .after(commands::after)
        .help(&HELP)
        .group(&GENERAL_GROUP);

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler)
        .framework(framework)
        .type_map_insert::<Registry>(registry)
        .await?;

    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }
    Ok(())
}
