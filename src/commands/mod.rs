use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;

use nearby_bot::search::SearchOutcome;
use nearby_bot::services::translation::TranslationService;
use nearby_bot::services::Coordinates;
use nearby_bot::session::{AppSession, SessionRegistry};
use nearby_bot::{GenericError, NearbyError};

use log::*;
use serenity::{
    framework::standard::{
        help_commands::with_embeds,
        macros::{command, group, help, hook},
        Args, CommandGroup, CommandResult, HelpOptions,
    },
    model::{channel::Message, id::UserId},
    prelude::*,
};

pub struct Registry;

impl TypeMapKey for Registry {
    type Value = Arc<SessionRegistry>;
}

#[help]
pub async fn help(
    context: &Context,
    msg: &Message,
    args: Args,
    help_options: &'static HelpOptions,
    groups: &[&'static CommandGroup],
    owners: HashSet<UserId>,
) -> CommandResult {
    let _ = with_embeds(context, msg, args, help_options, groups, owners).await?;
    Ok(())
}

#[group]
#[commands(
    search,
    find,
    here,
    locate,
    route,
    view,
    weather,
    translate,
    translator_url,
    register,
    login,
    logout,
    whoami
)]
pub struct General;

#[hook]
pub async fn after(ctx: &Context, msg: &Message, command_name: &str, command_result: CommandResult) {
    if let Err(why) = command_result {
        warn!("Command {} failed: {:?}", command_name, why);
        say(ctx, msg, format!("Could not run `{}`: {}", command_name, why)).await;
    }
}

async fn say(ctx: &Context, msg: &Message, text: impl Display) {
    if let Err(why) = msg.channel_id.say(&ctx.http, text).await {
        warn!("Error sending message: {:?}", why);
    }
}

async fn session_for(
    ctx: &Context,
    msg: &Message,
) -> Result<(Arc<SessionRegistry>, Arc<AppSession>), GenericError> {
    let registry = {
        let data = ctx.data.read().await;
        data.get::<Registry>()
            .cloned()
            .ok_or("session registry missing")?
    };
    let session = registry.session(msg.channel_id.0).await;
    Ok((registry, session))
}

/// Password-bearing messages should not stay in the channel.
async fn forget_message(ctx: &Context, msg: &Message) {
    if let Err(why) = msg.delete(ctx).await {
        debug!("Could not delete credential message: {:?}", why);
    }
}

#[command]
#[description("Find an address and search for it around that point.")]
#[usage("[address]")]
#[example("Bến Thành")]
async fn search(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let address = args.rest();
    if address.trim().is_empty() {
        say(ctx, msg, "Search for an address...").await;
        return Ok(());
    }

    let (_, session) = session_for(ctx, msg).await?;
    match session.search.search_address(address).await {
        Ok(_) => say(ctx, msg, session.map.render()).await,
        Err(NearbyError::AddressNotFound()) => say(ctx, msg, "Address not found").await,
        Err(why) => return Err(why.into()),
    }
    Ok(())
}

#[command]
#[description("Search places near the current center by name. No keyword lists food and drink.")]
#[usage("[keyword]")]
#[example("phở")]
async fn find(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let (_, session) = session_for(ctx, msg).await?;
    session.search.set_query(args.rest()).await;
    say(ctx, msg, session.map.render()).await;
    Ok(())
}

#[command]
#[description("Search around a point, as if clicked on the map.")]
#[usage("[lat] [lon]")]
#[example("10.7721 106.6983")]
#[num_args(2)]
async fn here(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let lat = args.single::<f64>()?;
    let lon = args.single::<f64>()?;
    let at = Coordinates::new(lat, lon)?;

    let (_, session) = session_for(ctx, msg).await?;
    session.search.map_click(at).await;
    say(ctx, msg, session.map.render()).await;
    Ok(())
}

#[command]
#[description("Recenter on the device position.")]
async fn locate(ctx: &Context, msg: &Message) -> CommandResult {
    let (registry, session) = session_for(ctx, msg).await?;
    let outcome = session
        .search
        .initialize(registry.services().geolocator.as_ref())
        .await;
    if outcome == SearchOutcome::Superseded {
        trace!("Locate result superseded by a newer search.");
    }
    say(ctx, msg, session.map.render()).await;
    Ok(())
}

#[command]
#[description("Get directions from the search location to a result.")]
#[usage("[result number]")]
#[example("2")]
#[num_args(1)]
async fn route(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let n = args.single::<usize>()?;
    let (_, session) = session_for(ctx, msg).await?;
    session.search.select_result(n).await?;
    say(ctx, msg, session.map.render()).await;
    Ok(())
}

#[command]
#[aliases("map")]
#[description("Show the map.")]
async fn view(ctx: &Context, msg: &Message) -> CommandResult {
    let (_, session) = session_for(ctx, msg).await?;
    let loading = if session.search.state().loading {
        "⏳ Searching...\n"
    } else {
        ""
    };
    say(ctx, msg, format!("{}{}", loading, session.map.render())).await;
    Ok(())
}

#[command]
#[description("Current weather at the search location.")]
async fn weather(ctx: &Context, msg: &Message) -> CommandResult {
    let (registry, session) = session_for(ctx, msg).await?;
    let report = session.weather_report(registry.services()).await;
    say(ctx, msg, report).await;
    Ok(())
}

#[command]
#[description("Dịch Anh - Việt")]
#[usage("[English text]")]
#[example("Where is the nearest market?")]
async fn translate(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let (registry, _) = session_for(ctx, msg).await?;
    let translated = registry.services().translator.translate(args.rest()).await;
    if translated.is_empty() {
        say(ctx, msg, "Kết quả dịch sẽ xuất hiện ở đây.").await;
    } else {
        say(ctx, msg, translated).await;
    }
    Ok(())
}

#[command]
#[description("Show or set the translation backend URL.")]
#[usage("[url]")]
#[example("https://example.ngrok.app")]
async fn translator_url(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let (registry, _) = session_for(ctx, msg).await?;
    let translator = &registry.services().translator;
    let url = args.rest().trim();
    if !url.is_empty() {
        translator.set_api_url(url)?;
    }
    say(ctx, msg, format!("Translation backend: {}", translator.api_url())).await;
    Ok(())
}

#[command]
#[description("Create an account.")]
#[usage("[email] [password] [confirm password]")]
#[num_args(3)]
async fn register(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let email = args.single::<String>()?;
    let password = args.single::<String>()?;
    let confirm = args.single::<String>()?;
    forget_message(ctx, msg).await;

    let (_, session) = session_for(ctx, msg).await?;
    let auth = match &session.auth {
        Some(auth) => auth,
        None => {
            say(ctx, msg, "Sign-in is not configured.").await;
            return Ok(());
        }
    };
    match auth.register(&email, &password, &confirm).await {
        Ok(user) => say(ctx, msg, format!("Registered and signed in as {}.", user.email)).await,
        Err(why) => say(ctx, msg, why).await,
    }
    Ok(())
}

#[command]
#[description("Sign in.")]
#[usage("[email] [password]")]
#[num_args(2)]
async fn login(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let email = args.single::<String>()?;
    let password = args.single::<String>()?;
    forget_message(ctx, msg).await;

    let (_, session) = session_for(ctx, msg).await?;
    let auth = match &session.auth {
        Some(auth) => auth,
        None => {
            say(ctx, msg, "Sign-in is not configured.").await;
            return Ok(());
        }
    };
    match auth.sign_in(&email, &password).await {
        Ok(user) => say(ctx, msg, format!("Signed in as {}.", user.email)).await,
        Err(why) => say(ctx, msg, why).await,
    }
    Ok(())
}

#[command]
#[description("Sign out.")]
async fn logout(ctx: &Context, msg: &Message) -> CommandResult {
    let (_, session) = session_for(ctx, msg).await?;
    if let Some(auth) = &session.auth {
        auth.sign_out();
    }
    say(ctx, msg, "Signed out.").await;
    Ok(())
}

#[command]
#[description("Show who is signed in.")]
async fn whoami(ctx: &Context, msg: &Message) -> CommandResult {
    let (_, session) = session_for(ctx, msg).await?;
    let user = session.auth.as_ref().and_then(|auth| auth.session().current());
    match user {
        Some(user) => say(ctx, msg, format!("Signed in as {}.", user.email)).await,
        None => say(ctx, msg, "Not signed in.").await,
    }
    Ok(())
}
