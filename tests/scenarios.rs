//! End-to-end behaviour of the engine facade, rendered offline.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use approx::assert_abs_diff_eq;
use parking_lot::Mutex;

use nebula_audio::dsp::mixer::peak;
use nebula_audio::procedural::{Environment, GameStateUpdate, Scale, safe_index};
use nebula_audio::settings::{MUTED_KEY, VOLUME_KEY};
use nebula_audio::{
    AudioBackend, AudioBuffer, BackendError, ClockState, EffectKind, EffectParams, EngineConfig, GameAudio,
    ManifestEntry, MemorySource, MusicMode, SettingsStore, WeaponCategory,
};

const SR: u32 = 44100;

struct CountingBackend {
    resumes: Arc<AtomicUsize>,
    blocked: Arc<AtomicBool>,
}

impl AudioBackend for CountingBackend {
    fn resume(&mut self) -> Result<(), BackendError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if self.blocked.load(Ordering::SeqCst) {
            return Err(BackendError::Blocked("no user gesture yet".into()));
        }
        Ok(())
    }

    fn suspend(&mut self) {}

    fn sample_rate(&self) -> u32 {
        SR
    }
}

#[derive(Clone, Default)]
struct SharedSettings(Arc<Mutex<HashMap<String, String>>>);

impl SettingsStore for SharedSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> nebula_audio::Result<()> {
        self.0.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

struct Harness {
    audio: GameAudio,
    resumes: Arc<AtomicUsize>,
    blocked: Arc<AtomicBool>,
    settings: SharedSettings,
}

fn harness_with(config: EngineConfig, source: MemorySource) -> Harness {
    let resumes = Arc::new(AtomicUsize::new(0));
    let blocked = Arc::new(AtomicBool::new(false));
    let settings = SharedSettings::default();
    let backend = CountingBackend {
        resumes: resumes.clone(),
        blocked: blocked.clone(),
    };
    let audio = GameAudio::new(config, Box::new(backend), Box::new(settings.clone()), Arc::new(source)).unwrap();
    Harness {
        audio,
        resumes,
        blocked,
        settings,
    }
}

fn running() -> GameAudio {
    let mut audio = GameAudio::offline(EngineConfig::default()).unwrap();
    audio.initialize().unwrap();
    audio
}

fn sine(seconds: f64, freq: f32) -> AudioBuffer {
    let frames = (seconds * SR as f64) as usize;
    let data = (0..frames)
        .map(|i| (i as f32 * freq * std::f32::consts::TAU / SR as f32).sin() * 0.8)
        .collect();
    AudioBuffer::mono(data, SR)
}

fn wav_bytes(seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SR,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in sine(seconds, 330.0).channel(0) {
            writer.write_sample((*s * 20000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn loudness(audio: &mut GameAudio, seconds: f64) -> f32 {
    let frames = (seconds * SR as f64) as usize;
    let (mut l, mut r) = (vec![0.0; frames], vec![0.0; frames]);
    audio.render(&mut l, &mut r);
    peak(&l).max(peak(&r))
}

#[test]
fn initialize_starts_the_backend_once() {
    let mut h = harness_with(EngineConfig::default(), MemorySource::new());
    for _ in 0..5 {
        h.audio.initialize().unwrap();
    }
    assert_eq!(h.resumes.load(Ordering::SeqCst), 1);
    assert!(h.audio.can_play_audio());
}

#[test]
fn blocked_start_is_retried_after_a_gesture() {
    let mut h = harness_with(EngineConfig::default(), MemorySource::new());
    h.blocked.store(true, Ordering::SeqCst);
    h.audio.initialize().unwrap();
    assert!(!h.audio.can_play_audio());
    assert_ne!(h.audio.clock_state(), ClockState::Running);

    h.blocked.store(false, Ordering::SeqCst);
    h.audio.initialize().unwrap();
    assert!(h.audio.can_play_audio());
    assert_eq!(h.resumes.load(Ordering::SeqCst), 2);
}

#[test]
fn volume_round_trips_and_clamps() {
    let mut h = harness_with(EngineConfig::default(), MemorySource::new());
    for x in [0.0, 0.25, 0.5, 0.99, 1.0] {
        h.audio.set_volume(x);
        assert_abs_diff_eq!(h.audio.volume(), x);
    }
    h.audio.set_volume(1.7);
    assert_abs_diff_eq!(h.audio.volume(), 1.0);
    h.audio.set_volume(-3.0);
    assert_abs_diff_eq!(h.audio.volume(), 0.0);
    assert_eq!(h.settings.get(VOLUME_KEY).as_deref(), Some("0"));
}

#[test]
fn double_mute_restores_loudness() {
    let mut h = harness_with(EngineConfig::default(), MemorySource::new());
    h.audio.initialize().unwrap();
    h.audio.set_volume(0.6);
    h.audio.advance(0.2);
    let before = h.audio.effective_gain();

    assert!(h.audio.toggle_mute());
    h.audio.advance(0.2);
    assert_abs_diff_eq!(h.audio.effective_gain(), 0.0);
    assert_eq!(h.settings.get(MUTED_KEY).as_deref(), Some("true"));

    assert!(!h.audio.toggle_mute());
    h.audio.advance(0.2);
    assert_abs_diff_eq!(h.audio.effective_gain(), before, epsilon = 1e-9);
}

#[test]
fn persisted_settings_are_restored() {
    let settings = SharedSettings::default();
    settings.0.lock().insert(VOLUME_KEY.into(), "0.3".into());
    settings.0.lock().insert(MUTED_KEY.into(), "true".into());
    let backend = CountingBackend {
        resumes: Arc::default(),
        blocked: Arc::default(),
    };
    let audio = GameAudio::new(
        EngineConfig::default(),
        Box::new(backend),
        Box::new(settings),
        Arc::new(MemorySource::new()),
    )
    .unwrap();
    assert_abs_diff_eq!(audio.volume(), 0.3);
    assert!(audio.is_muted());
}

#[tokio::test]
async fn essential_buffers_survive_cleanup() {
    let source = MemorySource::new()
        .with_asset("sfx/a.wav", wav_bytes(0.1))
        .with_asset("sfx/b.wav", wav_bytes(0.1));
    let h = harness_with(EngineConfig::default(), source);
    h.audio.load_sample("sfx/a.wav", "a", true).await.unwrap();
    h.audio.load_sample("sfx/b.wav", "b", false).await.unwrap();

    let report = h.audio.cleanup_unused_audio(true);
    assert_eq!(report.evicted, 1);
    assert!(h.audio.buffers().has_buffer("a"));
    assert!(!h.audio.buffers().has_buffer("b"));
}

#[tokio::test]
async fn concurrent_loads_decode_once() {
    let source = MemorySource::new()
        .with_latency(std::time::Duration::from_millis(20))
        .with_asset("music/menu.wav", wav_bytes(0.2));
    let h = harness_with(EngineConfig::default(), source);
    let (a, b) = tokio::join!(
        h.audio.load_sample("music/menu.wav", "menu", false),
        h.audio.load_sample("music/menu.wav", "menu", false),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(h.audio.buffers().decode_count(), 1);
}

#[tokio::test]
async fn load_failure_is_a_recoverable_error() {
    let h = harness_with(EngineConfig::default(), MemorySource::new());
    let err = h.audio.load_sample("missing.wav", "missing", false).await.unwrap_err();
    assert!(err.is_recoverable());
    assert!(!h.audio.buffers().has_buffer("missing"));
}

#[tokio::test]
async fn preload_reports_partial_failure() {
    let mut config = EngineConfig::default();
    config.essentials = vec![
        ManifestEntry::new("menu", "music/menu.wav").critical(),
        ManifestEntry::new("blip", "sfx/blip.wav"),
    ];
    let source = MemorySource::new().with_asset("music/menu.wav", wav_bytes(0.2));
    let h = harness_with(config, source);
    let report = h.audio.preload_essential_audio().await.unwrap();
    assert_eq!(report.loaded, vec!["menu".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_complete());
    assert!(h.audio.buffers().entry("menu").unwrap().essential);
}

#[test]
fn entering_a_mode_tears_down_the_others() {
    let mut audio = running();
    audio.register_buffer("menu", sine(2.0, 220.0), true);
    audio.register_buffer("base", sine(2.0, 110.0), false);

    assert!(audio.play_menu_music(false));
    audio.advance(0.2);
    assert_eq!(audio.music_mode(), MusicMode::SingleTrack);

    assert!(audio.start_layered_music("base"));
    assert_eq!(audio.music_mode(), MusicMode::Layered);
    assert_eq!(audio.active_music_modes(), vec![MusicMode::Layered]);
    assert!(!audio.is_music_playing("menu"));
    assert_eq!(audio.music().slot_count(), 0);

    assert!(audio.start_procedural_music());
    audio.advance(0.5);
    assert_eq!(audio.active_music_modes(), vec![MusicMode::Procedural]);
    assert!(audio.active_layers().is_empty());
}

#[test]
fn restart_during_fade_out_keeps_playing() {
    let mut audio = running();
    audio.register_buffer("menu", sine(1.0, 220.0), true);
    assert!(audio.play_menu_music(false));
    audio.advance(1.2);

    assert!(audio.stop_menu_music());
    audio.advance(0.05);
    assert!(audio.play_menu_music(false));

    audio.advance(1.5);
    assert!(audio.is_music_playing("menu"));
    assert_eq!(audio.music().slot_count(), 1);
    assert!(!audio.music().has_pending_stop("menu"));
    assert!(loudness(&mut audio, 0.1) > 0.05);
}

#[test]
fn removed_layer_is_disposed_once() {
    let mut audio = running();
    audio.register_buffer("base", sine(1.0, 110.0), false);
    audio.register_buffer("pad", sine(1.0, 330.0), false);
    assert!(audio.start_layered_music("base"));
    assert!(audio.add_music_layer("pad", 0.7));
    audio.advance(0.5);
    let live = audio.graph().live_count();

    assert!(audio.remove_music_layer("pad"));
    audio.advance(audio.config().music.layer_fade + 0.5);
    assert_eq!(audio.active_layers(), vec!["base".to_string()]);
    assert_eq!(audio.layered().disposed_layers(), 1);
    assert_eq!(audio.graph().live_count(), live - 2);

    assert!(!audio.remove_music_layer("pad"));
    audio.advance(1.0);
    assert_eq!(audio.layered().disposed_layers(), 1);
}

#[test]
fn stop_layered_frees_every_layer() {
    let mut audio = running();
    let baseline = audio.graph().live_count();
    audio.register_buffer("base", sine(1.0, 110.0), false);
    audio.register_buffer("drums", sine(1.0, 80.0), false);
    audio.start_layered_music("base");
    audio.add_music_layer("drums", 0.5);
    audio.advance(0.3);

    assert!(audio.stop_layered_music());
    audio.advance(audio.config().music.fade_out + 0.5);
    assert_eq!(audio.music_mode(), MusicMode::Idle);
    assert_eq!(audio.graph().live_count(), baseline);
}

#[test]
fn layered_start_without_base_fails_softly() {
    let mut audio = running();
    assert!(!audio.start_layered_music("nope"));
    assert_eq!(audio.music_mode(), MusicMode::Idle);
}

#[test]
fn intensity_is_clamped() {
    let mut audio = running();
    audio.set_intensity(1.5);
    assert_abs_diff_eq!(audio.procedural().intensity(), 1.0);
    audio.set_intensity(-0.5);
    assert_abs_diff_eq!(audio.procedural().intensity(), 0.0);
}

#[test]
fn safe_index_always_lands_in_the_table() {
    for scale in [Scale::Major, Scale::Minor, Scale::Dorian] {
        let table = scale.intervals();
        for i in -50i64..50 {
            let idx = safe_index(i, table.len());
            assert!(idx < table.len());
        }
        let idx = safe_index(i64::MIN, table.len());
        assert!(idx < table.len());
    }
}

#[test]
fn procedural_music_reacts_and_stops_cleanly() {
    let mut audio = running();
    let baseline = audio.graph().live_count();
    assert!(audio.start_procedural_music());
    assert!(audio.start_procedural_music());
    assert!(loudness(&mut audio, 2.0) > 0.01);

    audio.update_game_state(&GameStateUpdate {
        success: Some(0.9),
        environment: Some(Environment::Station),
        ..GameStateUpdate::default()
    });
    let bar = 60.0 / audio.config().procedural.base_tempo * 4.0;
    audio.advance(bar + 0.2);
    let state = audio.procedural_state();
    assert!(state.is_playing);
    assert_eq!(state.current_scale, Scale::Major);

    assert!(audio.stop_procedural_music());
    assert!(audio.procedural().is_playing());
    audio.advance(audio.config().procedural.fade_out + 1.0);
    assert!(!audio.procedural().is_playing());
    assert_eq!(audio.graph().live_count(), baseline);
}

#[test]
fn effects_chain_follows_list_order() {
    let mut audio = running();
    audio.add_effect("r", EffectParams::defaults(EffectKind::Reverb)).unwrap();
    audio.add_effect("d", EffectParams::defaults(EffectKind::Delay)).unwrap();
    audio.remove_effect("r").unwrap();

    let chain = audio.effects_chain();
    let expected = vec![chain.input(), chain.node_of("d").unwrap(), chain.output()];
    assert_eq!(audio.effects_signal_path(), expected);
}

#[test]
fn effect_updates_do_not_rebuild() {
    let mut audio = running();
    audio.add_effect("d", EffectParams::defaults(EffectKind::Delay)).unwrap();
    let rebuilds = audio.effects_chain().rebuild_count();
    audio.update_effect("d", EffectParams::defaults(EffectKind::Delay)).unwrap();
    assert_eq!(audio.effects_chain().rebuild_count(), rebuilds);
    assert!(audio.update_effect("missing", EffectParams::defaults(EffectKind::Delay)).is_err());
}

#[test]
fn builtin_presets_replace_the_chain() {
    let mut audio = running();
    audio.add_effect("x", EffectParams::defaults(EffectKind::Chorus)).unwrap();
    assert!(audio.apply_builtin_preset("space").unwrap());
    assert!(audio.effects_chain().node_of("x").is_none());
    assert!(!audio.effects_chain().is_empty());
    assert!(!audio.apply_builtin_preset("no-such-preset").unwrap());
}

#[test]
fn one_shot_effects_are_disposed_after_their_lifetime() {
    let mut audio = running();
    let baseline = audio.graph().live_count();
    for category in WeaponCategory::ALL {
        audio.play_laser_sound(category).unwrap();
    }
    audio.play_collision_sound(0.9).unwrap();
    assert!(audio.graph().live_count() > baseline);
    assert!(loudness(&mut audio, 0.1) > 0.01);

    audio.advance(1.5);
    assert_eq!(audio.graph().live_count(), baseline);
}

#[test]
fn engine_hum_runs_until_stopped() {
    let mut audio = running();
    let baseline = audio.graph().live_count();
    let hum = audio.start_engine_hum().unwrap();
    audio.advance(2.0);
    assert!(audio.sfx().is_live(hum));
    assert!(loudness(&mut audio, 0.2) > 0.01);

    assert_eq!(audio.stop_all_effects(0.2), 1);
    audio.advance(0.5);
    assert!(!audio.sfx().is_live(hum));
    assert_eq!(audio.graph().live_count(), baseline);
}

#[test]
fn missing_samples_return_nothing() {
    let mut audio = running();
    assert!(audio.play_sample("ghost", 0.5, false).is_none());
    assert!(!audio.play_menu_music(false));
    assert_eq!(audio.music_mode(), MusicMode::Idle);
}

#[test]
fn suspended_engine_renders_silence() {
    let mut audio = running();
    audio.play_explosion_sound(Default::default()).unwrap();
    audio.suspend();
    assert_eq!(loudness(&mut audio, 0.1), 0.0);
    audio.initialize().unwrap();
    assert!(loudness(&mut audio, 0.2) > 0.01);
}

#[test]
fn dispose_leaves_no_live_nodes() {
    let mut audio = running();
    audio.register_buffer("menu", sine(1.0, 220.0), true);
    audio.register_buffer("base", sine(1.0, 110.0), false);
    audio.play_menu_music(false);
    audio.play_sample("menu", 0.5, true);
    audio.play_explosion_sound(Default::default());
    audio.start_engine_hum();
    audio.apply_builtin_preset("danger").unwrap();
    audio.start_layered_music("base");
    audio.add_music_layer("menu", 0.4);
    audio.remove_music_layer("menu");
    audio.advance(0.3);

    audio.dispose();
    audio.dispose();
    assert_eq!(audio.graph().live_count(), 0);
    assert_eq!(audio.graph().created(), audio.graph().disposed());
    assert_eq!(audio.runtime().scheduler.pending(), 0);
    assert!(audio.add_effect("r", EffectParams::defaults(EffectKind::Reverb)).is_err());
}
