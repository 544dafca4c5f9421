use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::{Result, eyre::Context as _};
use itertools::Itertools;
use poise::serenity_prelude::*;
use rand::{Rng, seq::SliceRandom};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    database,
    lifecycle::{EditOutcome, Pass, Rendered, Timed},
    types::{Data, Giveaway},
    util::{human_join, is_not_found, is_valid_strftime, time_remaining},
};

pub const PARTY_POPPER: &str = "🎉";

const STARTED: &str = "🎉 New Giveaway Started! 🎉";
const ENDED: &str = "🎉 Giveaway Ended 🎉";

/// Added to every user supplied end time to make up for processing delays.
pub const END_TIME_GRACE: TimeDelta = TimeDelta::seconds(15);

const REACTION_PAGE_SIZE: u8 = 100;

impl Timed for Giveaway {
    fn message_id(&self) -> MessageId {
        self.message_id
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    fn rendered_mut(&mut self) -> &mut Rendered {
        &mut self.rendered
    }
}

/// Someone who reacted to a giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrant {
    pub user_id: UserId,
    pub name: String,
    pub bot: bool,
    /// The member's roles, if they are still in the guild.
    pub roles: Option<Vec<RoleId>>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl Entrant {
    fn from_member(member: &Member) -> Entrant {
        Entrant {
            user_id: member.user.id,
            name: member.user.name.clone(),
            bot: member.user.bot,
            roles: Some(member.roles.clone()),
            joined_at: member
                .joined_at
                .and_then(|joined_at| DateTime::from_timestamp(joined_at.unix_timestamp(), 0)),
        }
    }

    fn from_user(user: &User) -> Entrant {
        Entrant {
            user_id: user.id,
            name: user.name.clone(),
            bot: user.bot,
            roles: None,
            joined_at: None,
        }
    }
}

/// Why an entrant can't take part in a giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Bot,
    NotMember,
    MissingRole(RoleId),
    TooNew { required: u32, days: i64 },
}

/// The winners shown on an ended giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Winners {
    Mentions(Vec<UserId>),
    /// A link to the attached winners file.
    File(String),
}

/// The ending announcement of a giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub content: String,
    /// The name and contents of the winners file, when there are too many winners to mention.
    pub file: Option<(String, String)>,
}

fn mention(user_id: UserId) -> String {
    format!("<@{user_id}>")
}

fn requirement_lines(roles: &[RoleId], join_days: Option<u32>) -> Option<String> {
    let mut requirements = Vec::new();

    if !roles.is_empty() {
        requirements.push(format!(
            "Roles: {}",
            roles.iter().map(|role| format!("<@&{role}>")).join(" ")
        ));
    }

    if let Some(days) = join_days {
        requirements.push(format!("Days in Server: {days}"));
    }

    (!requirements.is_empty()).then(|| requirements.join("\n"))
}

fn format_time(time: DateTime<Utc>, datetime_format: Option<&str>) -> Option<String> {
    datetime_format
        .filter(|format| is_valid_strftime(format))
        .map(|format| time.format(format).to_string())
}

impl Giveaway {
    /// A link to the giveaway message.
    pub fn link(&self) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, self.channel_id, self.message_id
        )
    }

    /// The entry requirements, one per line.
    pub fn requirements(&self) -> Option<String> {
        requirement_lines(&self.roles, self.join_days)
    }

    /// Checks whether an entrant may take part.
    pub fn check_entry(&self, entrant: &Entrant, now: DateTime<Utc>) -> Result<(), Rejection> {
        if entrant.bot {
            return Err(Rejection::Bot);
        }

        if self.roles.is_empty() && self.join_days.is_none() {
            return Ok(());
        }

        let Some(roles) = &entrant.roles else {
            return Err(Rejection::NotMember);
        };

        if let Some(missing) = self.roles.iter().find(|role| !roles.contains(role)) {
            return Err(Rejection::MissingRole(*missing));
        }

        if let Some(required) = self.join_days {
            let days = entrant
                .joined_at
                .map_or(0, |joined_at| (now - joined_at).num_days());

            if days < required as i64 {
                return Err(Rejection::TooNew { required, days });
            }
        }

        Ok(())
    }

    fn running_embed(&self, now: DateTime<Utc>, datetime_format: Option<&str>) -> CreateEmbed {
        Draft::from(self).running_embed(now, datetime_format)
    }

    fn ended_embed(
        &self,
        now: DateTime<Utc>,
        winners: &Winners,
        datetime_format: Option<&str>,
    ) -> CreateEmbed {
        let winners = match winners {
            Winners::Mentions(users) if users.is_empty() => "Nobody".to_string(),
            Winners::Mentions(users) => {
                human_join(&users.iter().copied().map(mention).collect_vec(), "and")
            }
            Winners::File(url) => format!("[winners.txt]({url})"),
        };

        let embed = CreateEmbed::new()
            .title(&self.item)
            .color(0xffffff)
            .field("Giveaway by:", mention(self.author_id), true)
            .field("Winners:", winners, true);

        match format_time(now, datetime_format) {
            Some(time) => embed.footer(CreateEmbedFooter::new(format!("Ended at: {time}"))),
            None => embed
                .footer(CreateEmbedFooter::new("Ended at"))
                .timestamp(now),
        }
    }

    /// Builds the ending announcement for the given winners.
    pub fn announcement(&self, winners: &[Entrant], file_threshold: usize) -> Announcement {
        let (winners_text, file) = if winners.is_empty() {
            ("Nobody entered the giveaway.".to_string(), None)
        } else if winners.len() <= file_threshold {
            let mentions = winners.iter().map(|w| mention(w.user_id)).collect_vec();
            (human_join(&mentions, "and"), None)
        } else {
            let contents = winners
                .iter()
                .enumerate()
                .map(|(i, w)| format!("{}. - {} - {}", i + 1, w.user_id, w.name))
                .join("\n");
            (
                "See the attached file.".to_string(),
                Some((format!("winners - {}.txt", self.item), contents)),
            )
        };

        Announcement {
            content: format!(
                "{}\n**Giveaway Title:** {}\n**Giveaway Link:** {}\n**Winners:** {winners_text}",
                self.ending_message,
                self.item,
                self.link()
            ),
            file,
        }
    }
}

/// Picks up to `count` distinct winners uniformly at random.
pub fn pick_winners<R: Rng + ?Sized>(
    mut entrants: Vec<Entrant>,
    count: usize,
    rng: &mut R,
) -> Vec<Entrant> {
    if entrants.len() > count {
        entrants.shuffle(rng);
        entrants.truncate(count);
    }
    entrants
}

async fn datetime_format(data: &Data, guild_id: GuildId) -> Option<String> {
    match data.giveaway_defaults(guild_id).await {
        Ok(defaults) => defaults.datetime_format,
        Err(e) => {
            error!("Failed to fetch giveaway defaults for guild {guild_id}: {e:#}");
            None
        }
    }
}

/// A giveaway that hasn't been posted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub item: String,
    pub ending_message: String,
    pub end_time: DateTime<Utc>,
    pub winners: u32,
    pub roles: Vec<RoleId>,
    pub join_days: Option<u32>,
}

impl From<&Giveaway> for Draft {
    fn from(giveaway: &Giveaway) -> Draft {
        Draft {
            guild_id: giveaway.guild_id,
            channel_id: giveaway.channel_id,
            author_id: giveaway.author_id,
            item: giveaway.item.clone(),
            ending_message: giveaway.ending_message.clone(),
            end_time: giveaway.end_time,
            winners: giveaway.winners,
            roles: giveaway.roles.clone(),
            join_days: giveaway.join_days,
        }
    }
}

impl Draft {
    /// Raises the winners to at least 1 and treats a zero day requirement as none.
    fn normalized(self) -> Draft {
        Draft {
            winners: self.winners.max(1),
            join_days: self.join_days.filter(|days| *days > 0),
            ..self
        }
    }

    fn running_embed(&self, now: DateTime<Utc>, datetime_format: Option<&str>) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(&self.item)
            .description(format!("React with {PARTY_POPPER} to enter"))
            .color(0x00ff00)
            .field("Giveaway by:", mention(self.author_id), true)
            .field("Time Remaining:", time_remaining(self.end_time, now), true);

        if let Some(requirements) = requirement_lines(&self.roles, self.join_days) {
            embed = embed.field("Requirements", requirements, false);
        }

        match format_time(self.end_time, datetime_format) {
            Some(time) => embed.footer(CreateEmbedFooter::new(format!(
                "{} winners | Ends at: {time}",
                self.winners
            ))),
            None => embed
                .footer(CreateEmbedFooter::new(format!(
                    "{} winners | Ends at",
                    self.winners
                )))
                .timestamp(self.end_time),
        }
    }

    /// The running giveaway displayed in `message_id`, as rendered at `now`.
    fn posted(self, message_id: MessageId, now: DateTime<Utc>) -> Giveaway {
        let mut rendered = Rendered::default();
        rendered.update(time_remaining(self.end_time, now));

        Giveaway {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            message_id,
            author_id: self.author_id,
            item: self.item,
            ending_message: self.ending_message,
            end_time: self.end_time,
            winners: self.winners,
            roles: self.roles,
            join_days: self.join_days,
            rendered,
        }
    }
}

/// Posts a new giveaway, stores it and starts refreshing it.
pub async fn start(ctx: &Context, data: &Data, draft: Draft) -> Result<Giveaway> {
    let now = Utc::now();
    let draft = draft.normalized();
    let datetime_format = datetime_format(data, draft.guild_id).await;

    let message = draft
        .channel_id
        .send_message(
            ctx,
            CreateMessage::new()
                .content(STARTED)
                .embed(draft.running_embed(now, datetime_format.as_deref())),
        )
        .await
        .wrap_err("failed to send giveaway message")?;

    let giveaway = draft.posted(message.id, now);

    database::insert_giveaway(&data.pool, &giveaway).await?;
    data.giveaways.lock().await.insert(giveaway.clone());

    // entrants can still add the reaction themselves
    if let Err(e) = message
        .react(ctx, ReactionType::Unicode(PARTY_POPPER.into()))
        .await
    {
        warn!(
            "Failed to add the reaction to giveaway {}: {e:#}",
            giveaway.message_id
        );
    }

    info!(
        "Started giveaway {} in channel {}",
        giveaway.message_id, giveaway.channel_id
    );

    Ok(giveaway)
}

/// Turns a member lookup into an entrant.
///
/// A user who is no longer in the guild enters without roles. Other lookup errors are returned.
fn lookup_entrant(
    member: Result<Member, serenity::Error>,
    not_member: impl FnOnce() -> Entrant,
) -> Result<Entrant, serenity::Error> {
    match member {
        Ok(member) => Ok(Entrant::from_member(&member)),
        Err(e) if is_not_found(&e) => Ok(not_member()),
        Err(e) => Err(e),
    }
}

/// Fetches everyone who reacted with the giveaway emoji.
async fn collect_entrants(ctx: &Context, giveaway: &Giveaway) -> Result<Vec<Entrant>, serenity::Error> {
    let mut users: Vec<User> = Vec::new();
    let mut after = None;

    loop {
        let page = giveaway
            .channel_id
            .reaction_users(
                ctx,
                giveaway.message_id,
                ReactionType::Unicode(PARTY_POPPER.into()),
                Some(REACTION_PAGE_SIZE),
                after,
            )
            .await?;

        let done = page.len() < REACTION_PAGE_SIZE as usize;
        after = page.last().map(|user| user.id);
        users.extend(page);

        if done {
            break;
        }
    }

    let own_id = ctx.cache.current_user().id;
    let needs_member = !giveaway.roles.is_empty() || giveaway.join_days.is_some();
    let mut entrants = Vec::with_capacity(users.len());

    for user in users.iter().filter(|user| user.id != own_id && !user.bot) {
        if !needs_member {
            entrants.push(Entrant::from_user(user));
            continue;
        }

        let cached = ctx
            .cache
            .member(giveaway.guild_id, user.id)
            .map(|member| Entrant::from_member(&member));

        let entrant = match cached {
            Some(entrant) => entrant,
            None => lookup_entrant(giveaway.guild_id.member(ctx, user.id).await, || {
                Entrant::from_user(user)
            })?,
        };
        entrants.push(entrant);
    }

    Ok(entrants)
}

/// Drops the record, picks the winners, announces them and marks the display as ended.
///
/// When the entrants can't be collected the giveaway is put back into the registry, so it is
/// retried on the next tick.
pub async fn end(ctx: &Context, data: &Data, giveaway: &Giveaway) -> Result<()> {
    let now = Utc::now();
    let entrants = match collect_entrants(ctx, giveaway).await {
        Ok(entrants) => entrants,
        Err(e) if is_not_found(&e) => {
            database::remove_giveaway(&data.pool, giveaway.message_id).await?;
            return Err(e).wrap_err("failed to collect entrants");
        }
        Err(e) => {
            data.giveaways.lock().await.insert(giveaway.clone());
            return Err(e).wrap_err("failed to collect entrants");
        }
    };

    database::remove_giveaway(&data.pool, giveaway.message_id).await?;

    let eligible = entrants
        .into_iter()
        .filter(|entrant| giveaway.check_entry(entrant, now).is_ok())
        .collect_vec();
    let entered = eligible.len();

    let winners = pick_winners(
        eligible,
        giveaway.winners as usize,
        &mut rand::thread_rng(),
    );

    let announcement = giveaway.announcement(&winners, data.file_threshold());
    let mut message = CreateMessage::new().content(announcement.content);
    if let Some((name, contents)) = announcement.file {
        message = message.add_file(CreateAttachment::bytes(contents.into_bytes(), name));
    }

    let sent = giveaway
        .channel_id
        .send_message(ctx, message)
        .await
        .wrap_err("failed to send giveaway announcement")?;

    let winners = match sent.attachments.first() {
        Some(attachment) => Winners::File(attachment.url.clone()),
        None => Winners::Mentions(winners.iter().map(|winner| winner.user_id).collect()),
    };

    let datetime_format = datetime_format(data, giveaway.guild_id).await;
    giveaway
        .channel_id
        .edit_message(
            ctx,
            giveaway.message_id,
            EditMessage::new().content(ENDED).embed(giveaway.ended_embed(
                now,
                &winners,
                datetime_format.as_deref(),
            )),
        )
        .await
        .wrap_err("failed to edit giveaway message")?;

    info!(
        "Ended giveaway {} with {entered} eligible entrants",
        giveaway.message_id
    );

    Ok(())
}

/// Re-renders running giveaways and ends expired ones.
async fn tick(ctx: &Context, data: &Data) {
    let now = Utc::now();
    let Pass { expired, stale } = data
        .giveaways
        .lock()
        .await
        .plan(now, |giveaway, now| Some(time_remaining(giveaway.end_time, now)));

    let mut outcomes = Vec::with_capacity(stale.len());
    for giveaway in &stale {
        let datetime_format = datetime_format(data, giveaway.guild_id).await;
        let edit = EditMessage::new()
            .content(STARTED)
            .embed(giveaway.running_embed(now, datetime_format.as_deref()));

        let result = giveaway
            .channel_id
            .edit_message(ctx, giveaway.message_id, edit)
            .await;

        if let Err(e) = &result
            && !is_not_found(e)
        {
            error!("Failed to update giveaway {}: {e:#}", giveaway.message_id);
        }
        outcomes.push((giveaway.message_id, EditOutcome::of(&result)));
    }

    let gone = data.giveaways.lock().await.settle(outcomes);
    for giveaway in gone {
        warn!("Giveaway message {} is gone, dropping it", giveaway.message_id);
        if let Err(e) = database::remove_giveaway(&data.pool, giveaway.message_id).await {
            error!("Failed to remove giveaway {}: {e:#}", giveaway.message_id);
        }
    }

    for giveaway in expired {
        match end(ctx, data, &giveaway).await {
            Ok(()) => {}
            Err(e) if e.downcast_ref::<serenity::Error>().is_some_and(is_not_found) => {
                warn!("Giveaway {} is gone, dropping it", giveaway.message_id)
            }
            Err(e) => error!("Failed to end giveaway {}: {e:#}", giveaway.message_id),
        }
    }
}

/// Loads stored giveaways whose message still exists into the registry.
///
/// Giveaways that ended while the bot was offline are ended on the next tick.
async fn restore(ctx: &Context, data: &Data) -> Result<()> {
    let records = database::fetch_giveaways(&data.pool).await?;
    let mut restored = 0;

    for giveaway in records {
        match giveaway.channel_id.message(ctx, giveaway.message_id).await {
            Err(e) if is_not_found(&e) => {
                warn!("Giveaway message {} is gone, dropping it", giveaway.message_id);
                database::remove_giveaway(&data.pool, giveaway.message_id).await?;
                continue;
            }
            Err(e) => warn!(
                "Failed to fetch giveaway message {}: {e:#}",
                giveaway.message_id
            ),
            Ok(_) => {}
        }

        data.giveaways.lock().await.insert(giveaway);
        restored += 1;
    }

    info!("Restored {restored} giveaways");

    Ok(())
}

/// An infinite loop that keeps giveaway messages up to date.
pub async fn run(ctx: Context, data: Data) {
    if let Err(e) = restore(&ctx, &data).await {
        error!("Failed to restore giveaways: {e:#}");
    }

    loop {
        tick(&ctx, &data).await;
        sleep(data.giveaway_interval()).await;
    }
}

fn rejection_message(ctx: &Context, guild_id: GuildId, rejection: &Rejection) -> Option<String> {
    match rejection {
        Rejection::Bot | Rejection::NotMember => None,
        Rejection::MissingRole(role_id) => {
            let name = ctx
                .cache
                .guild(guild_id)
                .and_then(|guild| guild.roles.get(role_id).map(|role| role.name.clone()))
                .unwrap_or_else(|| "required".into());
            Some(format!("You need the {name} role to enter this giveaway!"))
        }
        Rejection::TooNew { required, days } => Some(format!(
            "You need to be in the server for at least {required} days to enter this giveaway! \
             You have been in it for only {days} days."
        )),
    }
}

/// Removes entries of members who don't meet a running giveaway's requirements.
pub async fn enforce_entry(ctx: &Context, data: &Data, reaction: &Reaction) -> Result<()> {
    if !matches!(&reaction.emoji, ReactionType::Unicode(emoji) if emoji == PARTY_POPPER) {
        return Ok(());
    }

    let (Some(guild_id), Some(member)) = (reaction.guild_id, reaction.member.as_ref()) else {
        return Ok(());
    };

    if member.user.bot {
        return Ok(());
    }

    let rejection = {
        let giveaways = data.giveaways.lock().await;
        let Some(giveaway) = giveaways.get(reaction.message_id) else {
            return Ok(());
        };

        match giveaway.check_entry(&Entrant::from_member(member), Utc::now()) {
            Ok(()) => return Ok(()),
            Err(rejection) => rejection,
        }
    };

    debug!(
        "Rejecting entry of {} to giveaway {}: {rejection:?}",
        member.user.id, reaction.message_id
    );

    reaction
        .delete(ctx)
        .await
        .wrap_err("failed to remove giveaway reaction")?;

    if let Some(message) = rejection_message(ctx, guild_id, &rejection) {
        let dm = async {
            member
                .user
                .id
                .create_dm_channel(ctx)
                .await?
                .id
                .send_message(ctx, CreateMessage::new().content(message))
                .await
        };

        // members may have DMs disabled
        if let Err(e) = dm.await {
            debug!("Failed to DM {}: {e:#}", member.user.id);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{database::memory_pool, lifecycle::Registry};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn giveaway() -> Giveaway {
        Giveaway {
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(2),
            message_id: MessageId::new(3),
            author_id: UserId::new(4),
            item: "Nitro".into(),
            ending_message: "Congratulations!".into(),
            end_time: now() + TimeDelta::hours(1),
            winners: 2,
            roles: Vec::new(),
            join_days: None,
            rendered: Rendered::default(),
        }
    }

    fn entrant(id: u64) -> Entrant {
        Entrant {
            user_id: UserId::new(id),
            name: format!("user{id}"),
            bot: false,
            roles: None,
            joined_at: None,
        }
    }

    fn member(id: u64, roles: &[u64], days: i64) -> Entrant {
        Entrant {
            roles: Some(roles.iter().copied().map(RoleId::new).collect()),
            joined_at: Some(now() - TimeDelta::days(days)),
            ..entrant(id)
        }
    }

    #[test]
    fn anyone_but_bots_may_enter_without_requirements() {
        let giveaway = giveaway();

        assert_eq!(giveaway.check_entry(&entrant(10), now()), Ok(()));
        assert_eq!(
            giveaway.check_entry(
                &Entrant {
                    bot: true,
                    ..entrant(11)
                },
                now()
            ),
            Err(Rejection::Bot)
        );
    }

    #[test]
    fn role_requirements_need_every_role() {
        let giveaway = Giveaway {
            roles: vec![RoleId::new(100), RoleId::new(200)],
            ..giveaway()
        };

        assert_eq!(
            giveaway.check_entry(&member(10, &[100, 200, 300], 0), now()),
            Ok(())
        );
        assert_eq!(
            giveaway.check_entry(&member(10, &[100], 0), now()),
            Err(Rejection::MissingRole(RoleId::new(200)))
        );
        assert_eq!(
            giveaway.check_entry(&entrant(10), now()),
            Err(Rejection::NotMember)
        );
    }

    #[test]
    fn join_days_requirement() {
        let giveaway = Giveaway {
            join_days: Some(7),
            ..giveaway()
        };

        assert_eq!(giveaway.check_entry(&member(10, &[], 7), now()), Ok(()));
        assert_eq!(
            giveaway.check_entry(&member(10, &[], 3), now()),
            Err(Rejection::TooNew {
                required: 7,
                days: 3
            })
        );
    }

    #[test]
    fn requirements_text() {
        assert_eq!(giveaway().requirements(), None);

        let giveaway = Giveaway {
            roles: vec![RoleId::new(100), RoleId::new(200)],
            join_days: Some(30),
            ..giveaway()
        };
        assert_eq!(
            giveaway.requirements().unwrap(),
            "Roles: <@&100> <@&200>\nDays in Server: 30"
        );
    }

    #[test]
    fn winners_are_distinct_entrants() {
        let entrants = (1..=10).map(entrant).collect_vec();
        let mut rng = StdRng::seed_from_u64(7);

        let winners = pick_winners(entrants.clone(), 3, &mut rng);

        assert_eq!(winners.len(), 3);
        assert!(winners.iter().all(|winner| entrants.contains(winner)));
        assert_eq!(winners.iter().map(|w| w.user_id).unique().count(), 3);
    }

    #[test]
    fn everyone_wins_when_there_are_few_entrants() {
        let entrants = (1..=2).map(entrant).collect_vec();
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(pick_winners(entrants.clone(), 5, &mut rng), entrants);
        assert!(pick_winners(Vec::new(), 5, &mut rng).is_empty());
    }

    #[test]
    fn announcement_mentions_winners() {
        let announcement = giveaway().announcement(&[entrant(10), entrant(11)], 20);

        assert_eq!(
            announcement.content,
            "Congratulations!\n\
             **Giveaway Title:** Nitro\n\
             **Giveaway Link:** https://discord.com/channels/1/2/3\n\
             **Winners:** <@10> and <@11>"
        );
        assert_eq!(announcement.file, None);
    }

    #[test]
    fn announcement_attaches_many_winners() {
        let winners = (10..13).map(entrant).collect_vec();
        let announcement = giveaway().announcement(&winners, 2);

        let (name, contents) = announcement.file.unwrap();
        assert_eq!(name, "winners - Nitro.txt");
        assert_eq!(
            contents,
            "1. - 10 - user10\n2. - 11 - user11\n3. - 12 - user12"
        );
        assert!(!announcement.content.contains("<@10>"));
    }

    #[test]
    fn announcement_without_entrants() {
        let announcement = giveaway().announcement(&[], 20);

        assert!(announcement.content.ends_with("**Winners:** Nobody entered the giveaway."));
    }

    #[test]
    fn footer_time_uses_valid_formats_only() {
        assert_eq!(
            format_time(now(), Some("%d/%m/%Y")),
            Some("16/10/2026".to_string())
        );
        assert_eq!(format_time(now(), Some("%Q")), None);
        assert_eq!(format_time(now(), None), None);
    }

    fn draft() -> Draft {
        Draft::from(&giveaway())
    }

    #[test]
    fn drafts_are_normalized_before_posting() {
        let draft = Draft {
            winners: 0,
            join_days: Some(0),
            ..draft()
        }
        .normalized();

        assert_eq!(draft.winners, 1);
        assert_eq!(draft.join_days, None);
        assert_eq!(Draft { join_days: Some(3), ..draft.clone() }.normalized().join_days, Some(3));
    }

    #[test]
    fn posted_giveaway_uses_the_sent_message() {
        let mut giveaway = draft().posted(MessageId::new(42), now());

        assert_eq!(giveaway.message_id, MessageId::new(42));
        assert_eq!(giveaway.item, "Nitro");
        assert_eq!(Draft::from(&giveaway), draft());
        // already shown when posted
        assert!(!giveaway.rendered.update(time_remaining(giveaway.end_time, now())));
    }

    #[test]
    fn failed_member_lookups_are_not_disqualifications() {
        let result = lookup_entrant(Err(serenity::Error::Other("unavailable")), || entrant(10));

        assert!(result.is_err());
    }

    #[test]
    fn unchanged_giveaways_are_not_edited() {
        let draft = Draft {
            end_time: now() + TimeDelta::hours(1) + TimeDelta::seconds(30),
            ..draft()
        };
        let mut registry = Registry::new();
        registry.insert(draft.posted(MessageId::new(3), now()));

        let pass = registry.plan(now() + TimeDelta::seconds(5), |g, now| {
            Some(time_remaining(g.end_time, now))
        });
        assert!(pass.expired.is_empty());
        assert!(pass.stale.is_empty());
    }

    #[tokio::test]
    async fn giveaway_expired_while_offline_ends_on_first_pass() {
        let pool = memory_pool().await;
        let expired = Giveaway {
            end_time: now() - TimeDelta::minutes(30),
            ..giveaway()
        };
        database::insert_giveaway(&pool, &expired).await.unwrap();
        database::insert_giveaway(&pool, &Giveaway {
            message_id: MessageId::new(4),
            ..giveaway()
        })
        .await
        .unwrap();

        let mut registry = Registry::new();
        for giveaway in database::fetch_giveaways(&pool).await.unwrap() {
            registry.insert(giveaway);
        }

        let pass = registry.plan(now(), |g, now| Some(time_remaining(g.end_time, now)));
        assert_eq!(pass.expired.len(), 1);
        assert_eq!(pass.expired[0].message_id, MessageId::new(3));
        assert_eq!(registry.len(), 1);
    }
}
