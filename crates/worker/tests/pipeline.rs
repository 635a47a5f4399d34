//! Integrationstests: Pipelines ueber den Worker-Thread

use std::sync::Arc;
use std::time::Duration;

use mediaseal_core::{EncodedFrame, FrameType, MediaKind, TrackId};
use mediaseal_crypto::{decrypt_frame, CryptoError, Key, KeyStore, KeyType, WireFrame};
use mediaseal_worker::{
    E2eeWorker, EncodedStreams, Operation, StopReason, TransformError, WorkerConfig, WorkerEvent,
    WorkerHandle,
};

fn worker() -> WorkerHandle {
    E2eeWorker::spawn(WorkerConfig::default(), Arc::new(KeyStore::new())).unwrap()
}

async fn warte_auf_event(
    events: &mut tokio::sync::broadcast::Receiver<WorkerEvent>,
    passt: impl Fn(&WorkerEvent) -> bool,
) -> WorkerEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.unwrap();
            if passt(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn keyframe_wird_verschluesselt_und_ist_entschluesselbar() {
    let handle = worker();
    let key = Key::generate("k1", KeyType::Encryption);
    handle.set_keys(vec![key.clone()]).await.unwrap();

    let id = TrackId::from("trk1");
    handle.register(id.clone()).await.unwrap();
    let (streams, mut ends) = EncodedStreams::pair(4);
    handle
        .activate(id, Operation::Encode, MediaKind::Video, streams)
        .await
        .unwrap();

    let mut data = vec![0x90u8; 10];
    data.extend((0..100u8).map(|b| b.wrapping_mul(3)));
    ends.input
        .send(EncodedFrame::video(0, FrameType::Key, data.clone()))
        .await
        .unwrap();

    let out = ends.output.recv().await.unwrap();
    // 10 Header + 100 Body + 16 Tag + 12 IV + 1 + 2 ("k1") + 1
    assert_eq!(out.data.len(), 142);
    assert_eq!(out.frame_type, Some(FrameType::Key));

    let klartext = decrypt_frame(&out.data, 10, &key).unwrap();
    assert_eq!(klartext.as_ref(), data.as_slice());
}

#[tokio::test]
async fn stop_ist_idempotent() {
    let handle = worker();
    handle.stop(TrackId::from("nie-registriert")).await.unwrap();

    let id = TrackId::from("t1");
    handle.register(id.clone()).await.unwrap();
    handle.stop(id.clone()).await.unwrap();
    handle.stop(id.clone()).await.unwrap();

    assert!(handle.pipelines().await.unwrap().is_empty());
    // Nach dem Stop ist eine neue Registrierung moeglich
    handle.register(id).await.unwrap();
}

#[tokio::test]
async fn zweite_aktivierung_wird_abgelehnt() {
    let handle = worker();
    let id = TrackId::from("t1");
    handle.register(id.clone()).await.unwrap();

    let (erste, _ends1) = EncodedStreams::pair(4);
    handle
        .activate(id.clone(), Operation::Decode, MediaKind::Audio, erste)
        .await
        .unwrap();

    let (zweite, _ends2) = EncodedStreams::pair(4);
    assert_eq!(
        handle
            .activate(id.clone(), Operation::Decode, MediaKind::Audio, zweite)
            .await,
        Err(TransformError::AlreadyActive(id))
    );
}

#[tokio::test]
async fn geschlossene_quelle_entfernt_pipeline() {
    let handle = worker();
    let mut events = handle.subscribe();
    let id = TrackId::from("t1");
    handle.register(id.clone()).await.unwrap();
    let (streams, ends) = EncodedStreams::pair(4);
    handle
        .activate(id.clone(), Operation::Encode, MediaKind::Audio, streams)
        .await
        .unwrap();

    drop(ends);

    let event = warte_auf_event(&mut events, |e| {
        matches!(e, WorkerEvent::PipelineStopped { .. })
    })
    .await;
    assert_eq!(
        event,
        WorkerEvent::PipelineStopped {
            id,
            reason: StopReason::SourceClosed
        }
    );
    assert!(handle.pipelines().await.unwrap().is_empty());
}

#[tokio::test]
async fn rotation_wirkt_auf_laufende_pipeline() {
    let handle = worker();
    handle
        .set_keys(vec![Key::generate("k1", KeyType::Encryption)])
        .await
        .unwrap();

    let id = TrackId::from("t1");
    handle.register(id.clone()).await.unwrap();
    let (streams, mut ends) = EncodedStreams::pair(4);
    handle
        .activate(id, Operation::Encode, MediaKind::Audio, streams)
        .await
        .unwrap();

    ends.input.send(EncodedFrame::audio(0, vec![1u8; 16])).await.unwrap();
    let vorher = ends.output.recv().await.unwrap();
    assert_eq!(WireFrame::parse(&vorher.data, 1).unwrap().key_id, "k1");

    handle
        .set_keys(vec![Key::generate("k2", KeyType::Encryption)])
        .await
        .unwrap();

    ends.input.send(EncodedFrame::audio(1, vec![1u8; 16])).await.unwrap();
    let nachher = ends.output.recv().await.unwrap();
    assert_eq!(WireFrame::parse(&nachher.data, 1).unwrap().key_id, "k2");
}

#[tokio::test]
async fn decode_reicht_unbekannte_frames_durch() {
    let handle = worker();
    let id = TrackId::from("rx");
    handle.register(id.clone()).await.unwrap();
    let (streams, mut ends) = EncodedStreams::pair(4);
    handle
        .activate(id.clone(), Operation::Decode, MediaKind::Audio, streams)
        .await
        .unwrap();

    let frame = EncodedFrame::audio(5, vec![0xF0, 1, 2, 3]);
    ends.input.send(frame.clone()).await.unwrap();
    assert_eq!(ends.output.recv().await.unwrap(), frame);

    let stats = handle.stats(id).await.unwrap().unwrap();
    assert_eq!(stats.passed_through, 1);
    assert_eq!(stats.frames_out, 1);
}

#[tokio::test]
async fn encode_ohne_schluessel_verwirft_frame() {
    let handle = worker();
    let mut events = handle.subscribe();
    let id = TrackId::from("tx");
    handle.register(id.clone()).await.unwrap();
    let (streams, mut ends) = EncodedStreams::pair(4);
    handle
        .activate(id.clone(), Operation::Encode, MediaKind::Audio, streams)
        .await
        .unwrap();

    ends.input.send(EncodedFrame::audio(0, vec![9u8; 12])).await.unwrap();

    let event = warte_auf_event(&mut events, |e| matches!(e, WorkerEvent::FrameDropped { .. })).await;
    assert_eq!(
        event,
        WorkerEvent::FrameDropped {
            id: id.clone(),
            error: CryptoError::NoEncryptionKey
        }
    );
    assert!(ends.output.try_recv().is_err());

    let stats = handle.stats(id).await.unwrap().unwrap();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.frames_out, 0);
}

#[tokio::test]
async fn stop_beendet_laufende_pipe() {
    let handle = worker();
    let id = TrackId::from("t1");
    handle.register(id.clone()).await.unwrap();
    let (streams, mut ends) = EncodedStreams::pair(4);
    handle
        .activate(id.clone(), Operation::Decode, MediaKind::Video, streams)
        .await
        .unwrap();

    handle.stop(id).await.unwrap();

    // Die Pipe gibt `writable` frei, der Ausgang endet
    let ende = tokio::time::timeout(Duration::from_secs(2), ends.output.recv())
        .await
        .unwrap();
    assert!(ende.is_none());
}
