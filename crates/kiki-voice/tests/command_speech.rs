//! Speech output through a stand-in `say` program.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use kiki_core::config::VoiceConfig;
use kiki_core::events::{DomainEvent, EventBus};
use kiki_voice::{CommandSynthesizer, SpeechSynthesizer, VoiceEngine};
use tokio::sync::mpsc;

const FAKE_SAY: &str = r#"#!/bin/sh
if [ "$1" = "-v" ] && [ "$2" = "?" ]; then
  echo "Alex                en_US    # Most people recognize me by my voice."
  echo "Thomas              fr_FR    # Bonjour."
fi
exit 0
"#;

fn install_fake_say(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("say");
    std::fs::write(&path, FAKE_SAY).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_command_synthesizer_speaks_and_reports_end() {
    let dir = tempfile::tempdir().unwrap();
    let program = install_fake_say(&dir);

    let (tx, rx) = mpsc::unbounded_channel();
    let synthesizer = CommandSynthesizer::detect(&program, tx).await.unwrap();
    assert_eq!(synthesizer.voices().len(), 2);

    let events = EventBus::default();
    let mut sub = events.subscribe();
    let engine = Arc::new(VoiceEngine::new(
        None,
        Some(Arc::new(synthesizer)),
        events,
        &VoiceConfig::default(),
    ));
    tokio::spawn(engine.clone().run_platform_signals(rx));

    let id = engine.speak("**Hello** there").unwrap().unwrap();
    assert_eq!(engine.selected_voice().as_deref(), Some("Alex"));

    let ended = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match sub.recv().await {
                Ok(DomainEvent::UtteranceEnded { utterance_id, .. }) => break utterance_id,
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(ended, id);
    assert!(!engine.is_speaking());
}
