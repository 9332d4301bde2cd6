//! # Replication Soak Simulation
//!
//! Headless world-sync soak: a seeded world of props, a squad of bots
//! that join, wander and drop out, and one observer smoothing a remote
//! avatar from the event stream.
//!
//! ## Usage
//!
//! ```bash
//! replication_sim --bots 8 --seconds 30 --seed 7
//! ```

use std::sync::Arc;

use meridian_replication::config::UpdateRate;
use meridian_replication::world::{AttrValue, PLAYER_NAME};
use meridian_replication::{
    AvatarSmoother, Capabilities, ChannelTransport, ConfigStore, HandshakeMsg, NodeId, NodeRole,
    ObjectId, PeerLink, RecordingMaterializer, ReplicationEvent, ReplicationPipeline,
    SessionState, SyncConfig, TransportBackend, WorldObject,
};
use meridian_shared::math::{Quaternion, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

const FRAME_SECS: f32 = 0.05;
const SERVER: NodeId = NodeId(1);
const WALK_SPEED: f32 = 4.0;
const WORLD_EXTENT: f32 = 256.0;
const PROP_COUNT: u64 = 600;

struct SimArgs {
    bots: u64,
    seconds: u32,
    seed: u64,
}

struct Bot {
    node: NodeId,
    avatar: ObjectId,
    position: Vec3,
    heading: f32,
    joined: bool,
    rejoin_frame: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let Some(args) = parse_args() else {
        return;
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         MERIDIAN REPLICATION - SOAK SIMULATION                   ║");
    println!("║         join / wander / drop / rejoin                            ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Bots:               {}", args.bots);
    println!("│ Duration:           {} simulated seconds", args.seconds);
    println!("│ Seed:               {}", args.seed);
    println!("│ Frame:              {FRAME_SECS} s (20 Hz)");
    println!("│ World:              {PROP_COUNT} props within ±{WORLD_EXTENT} m");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let config_store = Arc::new(ConfigStore::with_defaults());
    let (transport, events) = ChannelTransport::bounded(8192);
    let mut pipeline = ReplicationPipeline::assemble(
        Capabilities::with_role(NodeRole::DedicatedServer, TransportBackend::Direct),
        SERVER,
        Arc::clone(&config_store),
        RecordingMaterializer::new(),
        transport,
    )
    .expect("a fixed non-null server id assembles");

    seed_world(&mut pipeline, &mut rng);
    pipeline.set_session(SessionState::Connected);

    let mut bots: Vec<Bot> = (0..args.bots)
        .map(|i| Bot {
            node: NodeId(10 + i),
            avatar: ObjectId(100 + i),
            position: Vec3::new(
                rng.gen_range(-40.0..40.0),
                0.0,
                rng.gen_range(-40.0..40.0),
            ),
            heading: rng.gen_range(0.0..std::f32::consts::TAU),
            joined: false,
            rejoin_frame: u64::MAX,
        })
        .collect();
    let mut remote_links: HashMap<NodeId, PeerLink> = HashMap::new();

    // The observer peer smooths the first bot's avatar from its updates
    let watched_avatar = ObjectId(100);
    let observer = NodeId(11);
    let mut smoother = AvatarSmoother::new();
    let mut last_observe_clock = 0.0f64;
    let mut smoothing_samples = 0u64;
    let mut smoothing_error_sum = 0.0f32;
    let mut smoothing_error_max = 0.0f32;

    let total_frames = u64::from(args.seconds) * 20;
    let reload_frame = total_frames / 2;
    let mut clock = 0.0f64;
    let mut created_events = 0u64;
    let mut destroyed_events = 0u64;
    let mut update_events = 0u64;
    let mut departures = 0u64;

    for frame in 0..total_frames {
        clock += f64::from(FRAME_SECS);

        // Staggered joins: one bot every half second
        for (i, bot) in bots.iter_mut().enumerate() {
            if !bot.joined && frame == (i as u64) * 10 {
                join_bot(&mut pipeline, &mut remote_links, bot);
            }
        }

        // Wander, drop out, rejoin
        for (i, bot) in bots.iter_mut().enumerate() {
            if !bot.joined {
                if frame == bot.rejoin_frame {
                    join_bot(&mut pipeline, &mut remote_links, bot);
                }
                continue;
            }
            if i >= 2 && rng.gen_bool(0.000_5) {
                pipeline.peer_disconnected(bot.node);
                pipeline.store_mut().remove(bot.avatar);
                remote_links.remove(&bot.node);
                bot.joined = false;
                bot.rejoin_frame = frame + 200;
                departures += 1;
                continue;
            }
            bot.heading += rng.gen_range(-0.3..0.3);
            let step = Vec3::new(bot.heading.cos(), 0.0, bot.heading.sin()) * WALK_SPEED * FRAME_SECS;
            bot.position = clamp_to_world(bot.position + step);
            pipeline.store_mut().set_position(bot.avatar, bot.position);
            pipeline
                .store_mut()
                .set_rotation(bot.avatar, yaw_rotation(bot.heading));
            pipeline
                .peer_position(bot.node, bot.position)
                .expect("joined bots stay admitted");
        }

        // Mid-run hot reload: slower updates, tighter throttle ring
        if frame == reload_frame {
            let reloaded = SyncConfig {
                update_rate: UpdateRate::ThreeQuarters,
                throttle_distance: 150.0,
                ..SyncConfig::default()
            };
            config_store
                .install(reloaded)
                .expect("the reload snapshot is valid");
        }

        pipeline.advance(FRAME_SECS);

        // Play the remote half of each compression negotiation
        for (peer, message) in pipeline.drain_control() {
            let Some(link) = remote_links.get_mut(&peer) else {
                continue;
            };
            match message {
                HandshakeMsg::Version(version) => {
                    if let Some(reply) = link.on_version(version) {
                        pipeline.handshake_message(peer, reply);
                    }
                }
                HandshakeMsg::Enabled(enabled) => {
                    if let Some(reply) = link.on_enabled(enabled) {
                        pipeline.handshake_message(peer, reply);
                    }
                }
                HandshakeMsg::Started(started) => link.on_started(started),
            }
        }

        // Drain the event feed; the observer smooths the watched avatar
        for (peer, event) in events.try_iter() {
            match event {
                ReplicationEvent::ObjectCreated { .. } => created_events += 1,
                ReplicationEvent::ObjectDestroyed { .. } => destroyed_events += 1,
                ReplicationEvent::StateUpdate {
                    object_id,
                    position,
                    rotation,
                    ..
                } => {
                    update_events += 1;
                    if peer == observer && object_id == watched_avatar.0 {
                        smoother.observe(position, rotation, (clock - last_observe_clock) as f32);
                        last_observe_clock = clock;
                    }
                }
            }
        }
        let config = config_store.snapshot();
        let (display, _) = smoother.advance(FRAME_SECS, &config);
        if frame > 40 {
            if let Some(truth) = pipeline.store().get(watched_avatar) {
                let error = display.distance(truth.position());
                smoothing_samples += 1;
                smoothing_error_sum += error;
                smoothing_error_max = smoothing_error_max.max(error);
            }
        }

        if frame % 100 == 99 {
            let stats = pipeline.stats();
            println!(
                "  [t={:>3}s] peers={} objects={} created={} updates={} area_ready={}",
                (frame + 1) / 20,
                pipeline.peers().len(),
                pipeline.store().len(),
                stats.objects_created,
                stats.state_updates_sent,
                pipeline.is_area_ready(),
            );
        }
    }
    println!();

    report(
        &pipeline,
        created_events,
        destroyed_events,
        update_events,
        departures,
        smoothing_samples,
        smoothing_error_sum,
        smoothing_error_max,
        &bots,
    );
}

fn parse_args() -> Option<SimArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = SimArgs {
        bots: 8,
        seconds: 30,
        seed: 7,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bots" | "-b" => {
                if i + 1 < args.len() {
                    parsed.bots = args[i + 1].parse().unwrap_or(8);
                    i += 1;
                }
            }
            "--seconds" | "-s" => {
                if i + 1 < args.len() {
                    parsed.seconds = args[i + 1].parse().unwrap_or(30);
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    parsed.seed = args[i + 1].parse().unwrap_or(7);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: replication_sim [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --bots <NUM>       Bot count (default: 8)");
                println!("  -s, --seconds <SECS>   Simulated duration (default: 30)");
                println!("      --seed <SEED>      Deterministic seed (default: 7)");
                println!("  -h, --help             Show this help");
                return None;
            }
            _ => {}
        }
        i += 1;
    }
    Some(parsed)
}

fn seed_world(
    pipeline: &mut ReplicationPipeline<RecordingMaterializer, ChannelTransport>,
    rng: &mut ChaCha8Rng,
) {
    for i in 0..PROP_COUNT {
        let position = Vec3::new(
            rng.gen_range(-WORLD_EXTENT..WORLD_EXTENT),
            0.0,
            rng.gen_range(-WORLD_EXTENT..WORLD_EXTENT),
        );
        let mut prop = WorldObject::new(ObjectId(1000 + i), position);
        prop.set_persistent(true);
        // Every twentieth prop is a landmark visible from the outer rings
        if i % 20 == 0 {
            prop.set_distant(true);
        }
        pipeline.store_mut().insert(prop);
    }
}

fn join_bot(
    pipeline: &mut ReplicationPipeline<RecordingMaterializer, ChannelTransport>,
    remote_links: &mut HashMap<NodeId, PeerLink>,
    bot: &mut Bot,
) {
    if pipeline.peer_connected(bot.node, bot.position).is_err() {
        return;
    }
    pipeline
        .peer_ready(bot.node)
        .expect("the bot was just admitted");

    let mut avatar = WorldObject::new(bot.avatar, bot.position);
    avatar.set_attribute(
        PLAYER_NAME,
        AttrValue::Text(format!("bot-{}", bot.node.0 - 10)),
    );
    pipeline.store_mut().insert(avatar);
    pipeline.store_mut().set_owner(bot.avatar, bot.node);

    // The remote side opens its half of the negotiation
    let link = remote_links.entry(bot.node).or_insert_with(|| PeerLink::new(true));
    let hello = link.begin();
    pipeline.handshake_message(bot.node, hello);
    bot.joined = true;
    bot.rejoin_frame = u64::MAX;
}

fn clamp_to_world(position: Vec3) -> Vec3 {
    Vec3::new(
        position.x.clamp(-WORLD_EXTENT, WORLD_EXTENT),
        0.0,
        position.z.clamp(-WORLD_EXTENT, WORLD_EXTENT),
    )
}

fn yaw_rotation(heading: f32) -> Quaternion {
    let half = heading * 0.5;
    Quaternion::new(0.0, half.sin(), 0.0, half.cos())
}

#[allow(clippy::too_many_arguments)]
fn report(
    pipeline: &ReplicationPipeline<RecordingMaterializer, ChannelTransport>,
    created_events: u64,
    destroyed_events: u64,
    update_events: u64,
    departures: u64,
    smoothing_samples: u64,
    smoothing_error_sum: f32,
    smoothing_error_max: f32,
    bots: &[Bot],
) {
    let stats = pipeline.stats();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                     SIMULATION RESULTS                           ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ PIPELINE ──────────────────────────────────────────────────────┐");
    println!("│ Lifecycle Ticks:    {}", stats.lifecycle_ticks);
    println!("│ Send Ticks:         {}", stats.send_ticks);
    println!("│ Objects Created:    {}", stats.objects_created);
    println!("│ Objects Destroyed:  {}", stats.objects_destroyed);
    println!("│ Ownership Claims:   {}", stats.claims);
    println!("│ Ownership Releases: {}", stats.releases);
    println!("│ Owners Healed:      {}", stats.healed);
    println!("│ Updates Sent:       {}", stats.state_updates_sent);
    println!("│ Sends Deferred:     {}", stats.sends_deferred);
    println!("│ Objects Pruned:     {}", stats.pruned);
    println!("│ Config Reloads:     {}", stats.config_reloads);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ EVENT FEED ────────────────────────────────────────────────────┐");
    println!("│ Created:            {created_events}");
    println!("│ Destroyed:          {destroyed_events}");
    println!("│ State Updates:      {update_events}");
    println!("│ Dropped (backlog):  {}", pipeline.transport().dropped());
    println!("│ Bot Departures:     {departures}");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let negotiated = bots
        .iter()
        .filter(|bot| {
            bot.joined
                && pipeline
                    .handshakes()
                    .link(bot.node)
                    .is_some_and(PeerLink::sending_compressed)
        })
        .count();
    let joined = bots.iter().filter(|bot| bot.joined).count();
    println!("┌─ COMPRESSION ───────────────────────────────────────────────────┐");
    println!("│ Joined Bots:        {joined}");
    println!("│ Sending Compressed: {negotiated}");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let avg_error = if smoothing_samples > 0 {
        smoothing_error_sum / smoothing_samples as f32
    } else {
        0.0
    };
    println!("┌─ OBSERVER SMOOTHING ────────────────────────────────────────────┐");
    println!("│ Samples:            {smoothing_samples}");
    println!("│ Avg Error:          {avg_error:.3} m");
    println!("│ Max Error:          {smoothing_error_max:.3} m");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let healthy = stats.state_updates_sent > 0 && stats.claims > 0 && stats.config_reloads == 1;
    println!("╔══════════════════════════════════════════════════════════════════╗");
    if healthy {
        println!("║  ✓ SOAK PASSED                                                   ║");
        println!("║    Updates flowed, ownership settled, the reload took hold.      ║");
    } else {
        println!("║  ✗ SOAK FAILED                                                   ║");
        println!("║    Inspect the counters above.                                   ║");
    }
    println!("╚══════════════════════════════════════════════════════════════════╝");
}
