mod provider_stub;

use articlecast::credentials::Credential;
use articlecast::elevenlabs::{ElevenLabsClient, ElevenLabsConfig};
use articlecast::provider::{SpeechProvider as _, SynthesisError};
use articlecast::voice::{Voice, VoiceConfig, VoiceId};

use provider_stub::{CHAR_MS, ProviderStub, ProviderStubConfig, SAMPLE_RATE, StreamBehavior};

fn client(stub: &ProviderStub) -> ElevenLabsClient {
    ElevenLabsClient::new(ElevenLabsConfig {
        api_url: stub.api_url.clone(),
        ws_url: stub.ws_url.clone(),
        sample_rate: SAMPLE_RATE,
        safe_quota_margin: 1000,
    })
}

fn voice() -> Voice {
    Voice {
        id: "voice-1".to_owned(),
        nickname: "Ada".to_owned(),
        model: "eleven_multilingual_v2".to_owned(),
        name: None,
    }
}

fn credential() -> Credential {
    Credential::new("alice", "secret-a")
}

#[tokio::test(flavor = "multi_thread")]
async fn synthesis_returns_audio_and_word_alignment() {
    let stub = ProviderStub::spawn(ProviderStubConfig::default()).await;
    let text = "Hello brave world";

    let synthesis = client(&stub)
        .synthesize(text, &voice(), &credential())
        .await
        .expect("synthesize");

    let words = synthesis
        .alignment
        .iter()
        .map(|span| span.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(words, vec!["Hello", "brave", "world"]);
    assert_eq!(synthesis.alignment[1].start, 6 * CHAR_MS);
    let expected_secs = (text.len() as u64 * CHAR_MS) as f64 / 1000.0;
    assert!((synthesis.audio.duration_secs() - expected_secs).abs() < 1e-9);
    assert_eq!(stub.spoken(), vec![text.to_owned()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn low_quota_stops_before_streaming() {
    let stub = ProviderStub::spawn(ProviderStubConfig {
        remaining_quota: 999,
        ..ProviderStubConfig::default()
    })
    .await;

    let err = client(&stub)
        .synthesize("Hello", &voice(), &credential())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SynthesisError::SafeQuotaStop {
            remaining: 999,
            margin: 1000
        }
    ));
    assert!(stub.spoken().is_empty());
}

fn kind(err: &SynthesisError) -> String {
    match err {
        SynthesisError::QuotaExceeded(_) => "quota".to_owned(),
        SynthesisError::SystemBusy(_) => "busy".to_owned(),
        SynthesisError::VoiceNotFound { voice, .. } => format!("voice:{voice}"),
        SynthesisError::UnusualActivity(_) => "unusual".to_owned(),
        SynthesisError::Provider { code, .. } => format!("provider:{code}"),
        other => format!("{other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_error_codes_map_to_kinds() {
    for (code, expected) in [
        ("quota_exceeded", "quota"),
        ("system_busy", "busy"),
        ("voice_id_does_not_exist", "voice:voice-1"),
        ("detected_unusual_activity", "unusual"),
        ("teapot", "provider:teapot"),
    ] {
        let stub = ProviderStub::spawn(ProviderStubConfig {
            behavior: StreamBehavior::Fail(code),
            ..ProviderStubConfig::default()
        })
        .await;
        let err = client(&stub)
            .synthesize("Hello", &voice(), &credential())
            .await
            .unwrap_err();
        assert_eq!(kind(&err), expected, "{code}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_handshake_is_reported_as_rejection() {
    let stub = ProviderStub::spawn(ProviderStubConfig {
        behavior: StreamBehavior::Reject,
        ..ProviderStubConfig::default()
    })
    .await;

    let err = client(&stub)
        .synthesize("Hello", &voice(), &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, SynthesisError::ConnectionRejected(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn voice_resolution_tries_candidates_in_order() {
    let stub = ProviderStub::spawn(ProviderStubConfig {
        known_voices: vec!["second".to_owned()],
        ..ProviderStubConfig::default()
    })
    .await;
    let config = VoiceConfig {
        id: VoiceId::Candidates(vec!["first".to_owned(), "second".to_owned()]),
        nickname: "Ada".to_owned(),
        usable: true,
        model: "m".to_owned(),
    };

    let voice = client(&stub)
        .resolve_voice(&config, &credential())
        .await
        .expect("resolve voice");
    assert_eq!(voice.id, "second");
    assert_eq!(voice.name.as_deref(), Some("Stub second"));

    let unknown = VoiceConfig {
        id: VoiceId::Single("ghost".to_owned()),
        ..config
    };
    let voice = client(&stub)
        .resolve_voice(&unknown, &credential())
        .await
        .expect("fallback voice");
    assert_eq!(voice.id, "ghost");
    assert!(voice.name.is_none());
}
