// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use super::*;
use crate::{
    arena::Arena,
    codec::B12,
    events::ExplorerEntry,
    grid::BLOCK_SIZE,
    storage::{FileKind, MemoryStorage},
    testutil::{encoded_audio, note_at, tone_blocks, Rig},
    tracks::encode_midi_loop,
};

fn audio_file(blocks: usize, level: i16) -> Vec<u8> {
    encoded_audio(&tone_blocks(blocks, level))
}

fn storage_with(files: &[(&str, &str, Vec<u8>)]) -> MemoryStorage {
    let mut storage = MemoryStorage::new();
    for (name, extension, data) in files {
        storage
            .insert(name, extension, data.clone())
            .expect("insert failed");
    }
    storage
}

/// Lists files of `kind` and returns the explorer position of `display_name`.
fn explore(rig: &mut Rig, kind: FileKind, display_name: &str) -> usize {
    rig.send(ParameterEvent::EnterFileExplorer { kind });
    rig.status_events()
        .into_iter()
        .find_map(|event| match event {
            UiEvent::EnterFileExplorer(listing) => listing
                .iter()
                .position(|entry| entry.display_name == display_name),
            _ => None,
        })
        .expect("file should be listed")
}

fn load(rig: &mut Rig, cell: Cell, kind: FileKind, display_name: &str) {
    let index = explore(rig, kind, display_name);
    rig.send(ParameterEvent::LoadFile { cell, index });
    assert_eq!(
        vec![UiEvent::FileLoaded { cell, ok: true }],
        rig.status_events()
    );
}

fn toggle(rig: &mut Rig, cell: Cell) {
    rig.send(ParameterEvent::PlayOrStopTrack { cell });
}

fn is_playing(rig: &Rig, cell: Cell) -> bool {
    rig.sequencer
        .audio_tracks_at(cell)
        .any(|track| track.is_playing())
}

fn note_on(channel: u8, key: u8) -> [u8; 3] {
    [0x90 | channel, key, 100]
}

#[test]
fn test_clock_and_transport() {
    let mut rig = Rig::new(MemoryStorage::new());
    assert_eq!(GRID_COLS, rig.sequencer.max_loop_length());

    rig.run(1);
    assert_eq!(1, rig.sequencer.master_clock());
    assert_eq!(vec![UiEvent::TransportMove(0)], rig.ui_events());

    rig.run(1);
    assert_eq!(vec![UiEvent::TransportMove(1)], rig.ui_events());
    assert!(rig.ui_events().is_empty());

    rig.run(6);
    assert_eq!(0, rig.sequencer.master_clock());
    rig.run(3);
    assert_eq!(3, rig.sequencer.master_clock());
    assert!(rig.left.iter().chain(rig.right.iter()).all(|s| *s == 0));
}

#[test]
fn test_long_file_raises_max_loop_length() {
    let mut rig = Rig::new(storage_with(&[("long", "b12", audio_file(32, 1000))]));
    let cell = Cell::new(0, 1);
    load(&mut rig, cell, FileKind::Audio, "LONG.B12");

    assert_eq!(32, rig.sequencer.max_loop_length());
    let track = rig.sequencer.audio_tracks_at(cell).next().expect("track loaded");
    assert_eq!(32, track.file_length());
    assert_eq!(32, track.loop_length());

    // The transport walks one column every four blocks.
    toggle(&mut rig, cell);
    rig.run(5);
    assert_eq!(1, rig.sequencer.transport_progress());

    // Stopping the only loop lets the shared length fall back.
    toggle(&mut rig, cell);
    assert_eq!(GRID_COLS, rig.sequencer.max_loop_length());
    assert!(rig.sequencer.master_clock() < GRID_COLS);
}

#[test]
fn test_shorter_loops_fit_the_shared_loop() {
    let mut rig = Rig::new(storage_with(&[
        ("long", "b12", audio_file(48, 1000)),
        ("short", "b12", audio_file(16, 1000)),
        ("odd", "b12", audio_file(20, 1000)),
    ]));
    let long = Cell::new(0, 1);
    let short = Cell::new(1, 1);
    let odd = Cell::new(0, 2);
    load(&mut rig, long, FileKind::Audio, "LONG.B12");
    load(&mut rig, short, FileKind::Audio, "SHORT.B12");
    load(&mut rig, odd, FileKind::Audio, "ODD.B12");

    toggle(&mut rig, long);
    assert_eq!(48, rig.sequencer.max_loop_length());

    let loop_length = |rig: &Rig, cell| {
        rig.sequencer
            .audio_tracks_at(cell)
            .next()
            .map(|track| track.loop_length())
    };
    assert_eq!(Some(48), loop_length(&rig, long));
    assert_eq!(Some(16), loop_length(&rig, short));
    // 20 blocks fit twice into 48, so the loop is padded to 24.
    assert_eq!(Some(24), loop_length(&rig, odd));
}

#[test]
fn test_loop_restarts_without_gaps() {
    let mut rig = Rig::new(storage_with(&[("beat", "b12", audio_file(2, 1000))]));
    let cell = Cell::new(0, 1);
    load(&mut rig, cell, FileKind::Audio, "BEAT.B12");
    toggle(&mut rig, cell);

    let expected = (B12::encode_sample(1000) as i16 - 2048) / 2;
    for _ in 0..10 {
        rig.run(1);
        assert!(rig.left.iter().all(|s| *s == expected));
        assert!(rig.right.iter().all(|s| *s == expected));
    }
    assert!(is_playing(&rig, cell));
}

#[test]
fn test_tracks_are_mixed() {
    let mut rig = Rig::new(storage_with(&[
        ("quiet", "b12", audio_file(8, 1000)),
        ("loud", "b12", audio_file(8, 2000)),
    ]));
    load(&mut rig, Cell::new(0, 1), FileKind::Audio, "QUIET.B12");
    load(&mut rig, Cell::new(0, 2), FileKind::Audio, "LOUD.B12");
    toggle(&mut rig, Cell::new(0, 1));
    toggle(&mut rig, Cell::new(0, 2));

    rig.run(1);
    let quiet = (B12::encode_sample(1000) as i16 - 2048) / 2;
    let loud = (B12::encode_sample(2000) as i16 - 2048) / 2;
    assert_eq!(vec![quiet + loud; BLOCK_SIZE], rig.left);
    assert_eq!(vec![quiet + loud; BLOCK_SIZE], rig.right);
}

#[test]
fn test_one_shot_plays_once() {
    let mut rig = Rig::new(storage_with(&[("hit", "b12", audio_file(3, 1000))]));
    let cell = Cell::new(2, 3);
    load(&mut rig, cell, FileKind::Audio, "HIT.B12");
    toggle(&mut rig, cell);

    rig.run(3);
    assert!(is_playing(&rig, cell));
    assert!(rig.left.iter().all(|s| *s != 0));
    assert!(rig.status_events().is_empty());

    rig.run(1);
    assert!(!is_playing(&rig, cell));
    assert!(rig.left.iter().all(|s| *s == 0));
    assert_eq!(vec![UiEvent::AudioTrackFinished(cell)], rig.status_events());

    // The one-shot stays loaded and can be fired again.
    toggle(&mut rig, cell);
    assert!(is_playing(&rig, cell));
}

#[test]
fn test_one_shot_never_stretches_the_loop() {
    let mut rig = Rig::new(storage_with(&[("boom", "b12", audio_file(100, 1000))]));
    let cell = Cell::new(0, 3);
    load(&mut rig, cell, FileKind::Audio, "BOOM.B12");
    assert_eq!(GRID_COLS, rig.sequencer.max_loop_length());

    toggle(&mut rig, cell);
    rig.run(20);
    assert!(is_playing(&rig, cell));
    assert_eq!(GRID_COLS, rig.sequencer.max_loop_length());
    assert_eq!(20 % GRID_COLS, rig.sequencer.master_clock());
}

#[test]
fn test_one_track_per_row() {
    let mut rig = Rig::new(storage_with(&[("a", "b12", audio_file(8, 1000))]));
    for cell in [
        Cell::new(0, 1),
        Cell::new(1, 1),
        Cell::new(0, 2),
        Cell::new(1, 3),
    ] {
        load(&mut rig, cell, FileKind::Audio, "A.B12");
    }

    toggle(&mut rig, Cell::new(0, 1));
    toggle(&mut rig, Cell::new(1, 1));
    assert!(!is_playing(&rig, Cell::new(0, 1)));
    assert!(is_playing(&rig, Cell::new(1, 1)));
    assert_eq!(
        vec![UiEvent::AudioTrackFinished(Cell::new(0, 1))],
        rig.status_events()
    );

    // The second loop row and the one-shot row exclude each other.
    toggle(&mut rig, Cell::new(0, 2));
    assert!(is_playing(&rig, Cell::new(0, 2)));
    toggle(&mut rig, Cell::new(1, 3));
    assert!(!is_playing(&rig, Cell::new(0, 2)));
    assert!(is_playing(&rig, Cell::new(1, 3)));
    assert!(is_playing(&rig, Cell::new(1, 1)));

    toggle(&mut rig, Cell::new(0, 2));
    assert!(!is_playing(&rig, Cell::new(1, 3)));
}

#[test]
fn test_stereo_pair() {
    let mut rig = Rig::new(storage_with(&[
        ("druml", "b12", audio_file(4, 1000)),
        ("drumr", "b12", audio_file(4, -1000)),
    ]));
    let cell = Cell::new(3, 2);
    load(&mut rig, cell, FileKind::Audio, "DRUMR.B12");

    let tracks: Vec<_> = rig.sequencer.audio_tracks_at(cell).collect();
    assert_eq!(2, tracks.len());
    assert_eq!("DRUML.B12", tracks[0].entry().display_name());
    assert_eq!((1.0, 0.0), tracks[0].amplitudes());
    assert_eq!("DRUMR.B12", tracks[1].entry().display_name());
    assert_eq!((0.0, 1.0), tracks[1].amplitudes());

    toggle(&mut rig, cell);
    rig.run(1);
    let level = |sample: i16| (B12::encode_sample(sample) as i16 - 2048) / 2;
    assert_eq!(vec![level(1000); BLOCK_SIZE], rig.left);
    assert_eq!(vec![level(-1000); BLOCK_SIZE], rig.right);

    // Finishing both halves is reported once.
    toggle(&mut rig, cell);
    assert_eq!(vec![UiEvent::AudioTrackFinished(cell)], rig.status_events());
}

#[test]
fn test_load_onto_wrong_row_fails() {
    let mut rig = Rig::new(storage_with(&[
        ("a", "b12", audio_file(1, 1000)),
        ("take", "mlp", encode_midi_loop(&[note_at(0, 60), note_at(4, 62)], 8)),
    ]));

    let index = explore(&mut rig, FileKind::Audio, "A.B12");
    for cell in [Cell::new(0, 0), Cell::new(0, 4), Cell::new(8, 1)] {
        rig.send(ParameterEvent::LoadFile { cell, index });
        assert_eq!(
            vec![UiEvent::FileLoaded { cell, ok: false }],
            rig.status_events()
        );
    }

    let index = explore(&mut rig, FileKind::Midi, "TAKE.MLP");
    let cell = Cell::new(0, 1);
    rig.send(ParameterEvent::LoadMidiRecording { cell, index });
    assert_eq!(
        vec![UiEvent::FileLoaded { cell, ok: false }],
        rig.status_events()
    );
    assert_eq!(0, rig.sequencer.audio_tracks().count());
    assert_eq!(0, rig.sequencer.midi_tracks().count());
}

#[test]
fn test_arena_exhaustion_and_reuse() {
    let arena = Arena::new(4096, 64);
    let mut rig = Rig::with_arena(
        storage_with(&[("a", "b12", audio_file(1, 1000))]),
        arena.clone(),
    );
    let index = explore(&mut rig, FileKind::Audio, "A.B12");
    let before = (arena.used(), arena.live_allocations());

    rig.send(ParameterEvent::LoadFile {
        cell: Cell::new(0, 1),
        index,
    });
    let loaded = (arena.used(), arena.live_allocations());
    rig.send(ParameterEvent::LoadFile {
        cell: Cell::new(1, 1),
        index,
    });
    assert_eq!(
        vec![
            UiEvent::FileLoaded {
                cell: Cell::new(0, 1),
                ok: true
            },
            UiEvent::FileLoaded {
                cell: Cell::new(1, 1),
                ok: false
            },
        ],
        rig.status_events()
    );
    // A failed load leaves nothing behind.
    assert_eq!(loaded, (arena.used(), arena.live_allocations()));

    rig.send(ParameterEvent::UnloadFile {
        cell: Cell::new(0, 1),
    });
    assert_eq!(before, (arena.used(), arena.live_allocations()));

    rig.send(ParameterEvent::LoadFile {
        cell: Cell::new(1, 1),
        index,
    });
    assert_eq!(
        vec![UiEvent::FileLoaded {
            cell: Cell::new(1, 1),
            ok: true
        }],
        rig.status_events()
    );
}

#[test]
fn test_reloading_a_cell_replaces_it() {
    let arena = Arena::default();
    let mut rig = Rig::with_arena(
        storage_with(&[
            ("a", "b12", audio_file(1, 1000)),
            ("b", "b12", audio_file(2, 1000)),
        ]),
        arena.clone(),
    );
    let cell = Cell::new(0, 1);
    load(&mut rig, cell, FileKind::Audio, "A.B12");
    let used = arena.used();
    load(&mut rig, cell, FileKind::Audio, "B.B12");

    let tracks: Vec<_> = rig.sequencer.audio_tracks_at(cell).collect();
    assert_eq!(1, tracks.len());
    assert_eq!("B.B12", tracks[0].entry().display_name());
    assert_eq!(used, arena.used());
}

#[test]
fn test_midi_thru_moves_to_active_channel() {
    let mut rig = Rig::new(MemoryStorage::new());
    rig.send(ParameterEvent::ActiveMidiChannel { channel: 2 });
    rig.send(ParameterEvent::ActiveMidiChannel { channel: 16 });
    assert_eq!(2, rig.sequencer.active_midi_channel());

    rig.sequencer.on_midi_event(&note_on(5, 60));
    rig.sequencer.on_midi_event(&[0xF8]);
    rig.sequencer.on_midi_event(&[]);

    let out: Vec<MidiEvent> = rig.sequencer.drain_outbound_midi().collect();
    assert_eq!(1, out.len());
    assert_eq!(&note_on(2, 60)[..], out[0].as_bytes());
    assert_eq!(0, rig.sequencer.drain_outbound_midi().count());
}

/// Records two notes onto `cell` while a 64-block loop plays, ending at block 37.
fn record_take(rig: &mut Rig, cell: Cell) {
    toggle(rig, Cell::new(0, 1));
    assert_eq!(64, rig.sequencer.max_loop_length());

    rig.send(ParameterEvent::StartMidiRecording { cell });
    assert_eq!(RecordingState::WaitingToRecord, rig.sequencer.recording_state());
    rig.run(1);
    assert_eq!(RecordingState::Recording, rig.sequencer.recording_state());

    rig.sequencer.on_midi_event(&note_on(9, 60));
    rig.run(29);
    rig.sequencer.on_midi_event(&[0x89, 60, 0]);
    rig.run(7);
    assert_eq!(37, rig.sequencer.master_clock());
    rig.send(ParameterEvent::EndMidiRecording);
}

fn recording_rig() -> Rig {
    Rig::new(storage_with(&[("long", "b12", audio_file(64, 1000))]))
}

#[test]
fn test_recording_becomes_a_loop() {
    let mut rig = recording_rig();
    load(&mut rig, Cell::new(0, 1), FileKind::Audio, "LONG.B12");
    let cell = Cell::new(0, 5);
    record_take(&mut rig, cell);

    assert_eq!(
        vec![
            UiEvent::MidiRecordingStarted(cell),
            UiEvent::MidiRecordingFinished(cell)
        ],
        rig.status_events()
    );
    assert_eq!(RecordingState::NotRecording, rig.sequencer.recording_state());

    let track = rig.sequencer.midi_track_at(cell).expect("loop created");
    assert_eq!(64, track.loop_length());
    assert_eq!(2, track.len());
    assert!(track.is_playing());
    assert!(!track.is_saved());

    // Playback comes out on the lane's channel.
    let _thru: Vec<_> = rig.sequencer.drain_outbound_midi().collect();
    rig.run_until_clock(1);
    let out: Vec<MidiEvent> = rig.sequencer.drain_outbound_midi().collect();
    assert_eq!(1, out.len());
    assert_eq!(&note_on(1, 60)[..], out[0].as_bytes());

    rig.run_until_clock(30);
    let out: Vec<MidiEvent> = rig.sequencer.drain_outbound_midi().collect();
    assert_eq!(vec![&[0x81u8, 60, 0][..]], out.iter().map(|e| e.as_bytes()).collect::<Vec<_>>());
}

#[test]
fn test_short_recording_is_discarded() {
    let mut rig = Rig::new(MemoryStorage::new());
    let cell = Cell::new(1, 4);
    rig.send(ParameterEvent::StartMidiRecording { cell });
    rig.run(1);
    rig.sequencer.on_midi_event(&note_on(0, 60));
    rig.run(2);
    rig.send(ParameterEvent::EndMidiRecording);

    assert_eq!(
        vec![
            UiEvent::MidiRecordingStarted(cell),
            UiEvent::MidiRecordingFinished(cell)
        ],
        rig.status_events()
    );
    assert!(rig.sequencer.midi_track_at(cell).is_none());
}

#[test]
fn test_recording_ended_at_the_wrap_keeps_the_whole_loop() {
    let mut rig = recording_rig();
    load(&mut rig, Cell::new(0, 1), FileKind::Audio, "LONG.B12");
    toggle(&mut rig, Cell::new(0, 1));

    let cell = Cell::new(0, 7);
    rig.send(ParameterEvent::StartMidiRecording { cell });
    rig.run(1);
    rig.sequencer.on_midi_event(&note_on(0, 60));
    rig.run(10);
    rig.sequencer.on_midi_event(&note_on(0, 64));

    // The clock has wrapped but the recorder only sees it on the next period.
    rig.run_until_clock(0);
    assert_eq!(RecordingState::Recording, rig.sequencer.recording_state());
    rig.send(ParameterEvent::EndMidiRecording);
    rig.status_events();

    let track = rig.sequencer.midi_track_at(cell).expect("loop created");
    assert_eq!(64, track.loop_length());
    assert_eq!(2, track.len());
}

#[test]
fn test_loop_length_holds_while_recording() {
    let mut rig = recording_rig();
    let audio = Cell::new(0, 1);
    load(&mut rig, audio, FileKind::Audio, "LONG.B12");
    toggle(&mut rig, audio);

    let cell = Cell::new(0, 6);
    rig.send(ParameterEvent::StartMidiRecording { cell });
    rig.run(1);
    rig.sequencer.on_midi_event(&note_on(0, 60));
    rig.run(39);
    rig.sequencer.on_midi_event(&note_on(0, 62));

    // Stopping the only audio loop would otherwise fall back to the floor.
    toggle(&mut rig, audio);
    assert_eq!(64, rig.sequencer.max_loop_length());
    assert_eq!(40, rig.sequencer.master_clock());

    rig.run(10);
    rig.send(ParameterEvent::EndMidiRecording);
    rig.status_events();

    let track = rig.sequencer.midi_track_at(cell).expect("loop created");
    assert_eq!(64, track.loop_length());
    assert_eq!(64, rig.sequencer.max_loop_length());

    // Both notes come back on the lane's channel, the late one included.
    let _thru: Vec<_> = rig.sequencer.drain_outbound_midi().collect();
    rig.run_until_clock(40);
    let out: Vec<MidiEvent> = rig.sequencer.drain_outbound_midi().collect();
    assert_eq!(
        vec![&note_on(2, 60)[..], &note_on(2, 62)[..]],
        out.iter().map(|event| event.as_bytes()).collect::<Vec<_>>()
    );
}

#[test]
fn test_recording_needs_a_midi_row() {
    let mut rig = Rig::new(MemoryStorage::new());
    rig.send(ParameterEvent::StartMidiRecording {
        cell: Cell::new(0, 2),
    });
    assert_eq!(RecordingState::NotRecording, rig.sequencer.recording_state());
}

#[test]
fn test_scene_round_trip() {
    let mut rig = recording_rig();
    let audio = Cell::new(0, 1);
    let midi = Cell::new(0, 5);
    load(&mut rig, audio, FileKind::Audio, "LONG.B12");
    record_take(&mut rig, midi);
    rig.status_events();

    rig.send(ParameterEvent::SaveScene {
        name: "set1".to_string(),
    });
    assert_eq!(
        vec![
            UiEvent::MidiTrackNotSaved(midi),
            UiEvent::SceneSavingStatus(false)
        ],
        rig.status_events()
    );

    rig.send(ParameterEvent::SaveMidiRecording {
        cell: midi,
        name: "take1".to_string(),
    });
    rig.send(ParameterEvent::SaveScene {
        name: "set1".to_string(),
    });
    assert_eq!(
        vec![
            UiEvent::MidiSavingStatus {
                cell: midi,
                ok: true
            },
            UiEvent::SceneSavingStatus(true)
        ],
        rig.status_events()
    );

    let storage = rig.sequencer.storage();
    let scene = storage
        .find_by_display_name("SET1.SCN")
        .expect("lookup failed")
        .expect("scene saved");
    let text = storage.read_to_end(scene.index).expect("read failed");
    assert_eq!(
        "VER: 1.0.0\nAUDIO: 0,1 LONG.B12\nMIDI: 0,5 TAKE1.MLP\n",
        String::from_utf8_lossy(&text)
    );

    rig.send(ParameterEvent::UnloadFile { cell: audio });
    rig.send(ParameterEvent::UnloadFile { cell: midi });
    assert_eq!(0, rig.sequencer.audio_tracks().count());

    let index = explore(&mut rig, FileKind::Scene, "SET1.SCN");
    rig.send(ParameterEvent::LoadScene { index });
    assert_eq!(
        vec![
            UiEvent::SceneTrackFileLoaded(audio),
            UiEvent::SceneTrackFileLoaded(midi),
            UiEvent::SceneLoadingStatus(true)
        ],
        rig.status_events()
    );

    let track = rig.sequencer.midi_track_at(midi).expect("loop restored");
    assert_eq!(64, track.loop_length());
    assert_eq!(2, track.len());
    assert_eq!(Some("TAKE1.MLP"), track.saved_as());
    assert_eq!(1, rig.sequencer.audio_tracks_at(audio).count());
}

#[test]
fn test_scene_with_missing_file_keeps_earlier_lines() {
    let scene = "VER: 1.0.0\nAUDIO: 0,1 A.B12\nAUDIO: 1,1 GONE.B12\n";
    let mut rig = Rig::new(storage_with(&[
        ("a", "b12", audio_file(1, 1000)),
        ("b", "b12", audio_file(1, 1000)),
        ("set", "scn", scene.as_bytes().to_vec()),
    ]));
    load(&mut rig, Cell::new(5, 2), FileKind::Audio, "B.B12");

    assert!(matches!(
        rig.sequencer.load_scene_by_name("SET.SCN"),
        Err(ControlError::FileNotFound(_))
    ));
    assert_eq!(1, rig.sequencer.audio_tracks_at(Cell::new(0, 1)).count());
    assert_eq!(0, rig.sequencer.audio_tracks_at(Cell::new(5, 2)).count());
}

#[test]
fn test_scene_with_bad_version_changes_nothing() {
    let mut rig = Rig::new(storage_with(&[
        ("a", "b12", audio_file(1, 1000)),
        ("set", "scn", b"VER: 2.0.0\nAUDIO: 0,1 A.B12\n".to_vec()),
    ]));
    load(&mut rig, Cell::new(5, 2), FileKind::Audio, "A.B12");

    let index = explore(&mut rig, FileKind::Scene, "SET.SCN");
    rig.send(ParameterEvent::LoadScene { index });
    assert_eq!(vec![UiEvent::SceneLoadingStatus(false)], rig.status_events());
    assert_eq!(1, rig.sequencer.audio_tracks_at(Cell::new(5, 2)).count());
}

#[test]
fn test_save_failure_is_reported() {
    let mut rig = Rig::new(MemoryStorage::new());
    rig.send(ParameterEvent::SaveScene {
        name: "bad name".to_string(),
    });
    rig.send(ParameterEvent::SaveMidiRecording {
        cell: Cell::new(0, 4),
        name: "take".to_string(),
    });
    assert_eq!(
        vec![
            UiEvent::SceneSavingStatus(false),
            UiEvent::MidiSavingStatus {
                cell: Cell::new(0, 4),
                ok: false
            }
        ],
        rig.status_events()
    );
}

#[test]
fn test_midi_loops_start_and_stop_on_boundaries() {
    let take = encode_midi_loop(&[note_at(0, 60), note_at(4, 62)], 8);
    let mut rig = Rig::new(storage_with(&[
        ("a", "mlp", take.clone()),
        ("b", "mlp", take),
    ]));
    let first = Cell::new(0, 4);
    let second = Cell::new(0, 6);
    let index = explore(&mut rig, FileKind::Midi, "A.MLP");
    rig.send(ParameterEvent::LoadMidiRecording { cell: first, index });
    let index = explore(&mut rig, FileKind::Midi, "B.MLP");
    rig.send(ParameterEvent::LoadMidiRecording {
        cell: second,
        index,
    });
    rig.status_events();

    toggle(&mut rig, first);
    assert!(rig.sequencer.midi_track_at(first).is_some_and(|t| t.is_playing()));

    rig.run(3);
    toggle(&mut rig, second);
    let track = rig.sequencer.midi_track_at(second).expect("loaded");
    assert!(track.is_waiting_to_play());
    assert!(!track.is_playing());

    rig.run_until_clock(0);
    assert!(rig.sequencer.midi_track_at(second).is_some_and(|t| t.is_playing()));

    toggle(&mut rig, first);
    assert!(rig.sequencer.midi_track_at(first).is_some_and(|t| t.is_waiting_to_stop()));
    rig.run(1);
    rig.run_until_clock(0);
    assert!(rig.sequencer.midi_track_at(first).is_some_and(|t| !t.is_playing()));
    assert_eq!(vec![UiEvent::MidiTrackFinished(first)], rig.status_events());

    // The last sounding loop stops at once.
    toggle(&mut rig, second);
    assert!(rig.sequencer.midi_track_at(second).is_some_and(|t| !t.is_playing()));
    assert_eq!(vec![UiEvent::MidiTrackFinished(second)], rig.status_events());
}

#[test]
fn test_delete_file() {
    let mut rig = Rig::new(storage_with(&[
        ("a", "b12", audio_file(1, 1000)),
        ("b", "b12", audio_file(1, 1000)),
        ("notes", "txt", vec![1, 2, 3]),
    ]));
    let cell = Cell::new(0, 1);
    load(&mut rig, cell, FileKind::Audio, "A.B12");

    rig.send(ParameterEvent::DeleteFile);
    let listing = rig
        .status_events()
        .into_iter()
        .find_map(|event| match event {
            UiEvent::EnterFileExplorer(listing) => Some(listing),
            _ => None,
        })
        .expect("files listed");
    let names: Vec<_> = listing.iter().map(|e| e.display_name.as_str()).collect();
    assert_eq!(vec!["A.B12", "B.B12"], names);

    rig.send(ParameterEvent::ConfirmDeleteFile { index: 0 });
    rig.send(ParameterEvent::ConfirmDeleteFile { index: 9 });
    assert_eq!(
        vec![UiEvent::FileDeleted(true), UiEvent::FileDeleted(false)],
        rig.status_events()
    );
    assert_eq!(0, rig.sequencer.audio_tracks_at(cell).count());

    rig.send(ParameterEvent::EnterFileExplorer {
        kind: FileKind::Audio,
    });
    assert_eq!(
        vec![UiEvent::EnterFileExplorer(vec![ExplorerEntry {
            display_name: "B.B12".to_string(),
            storage_index: 1
        }])],
        rig.status_events()
    );
}

#[test]
fn test_invalid_filesystem() {
    let mut rig = Rig::new(MemoryStorage::invalid());
    assert!(!rig.sequencer.verify_file_system());
    rig.send(ParameterEvent::EnterFileExplorer {
        kind: FileKind::Audio,
    });
    assert_eq!(
        vec![UiEvent::InvalidFilesystem, UiEvent::InvalidFilesystem],
        rig.status_events()
    );

    let mut rig = Rig::new(MemoryStorage::new());
    assert!(rig.sequencer.verify_file_system());
}

#[test]
fn test_parameter_queue_is_drained() {
    let mut rig = Rig::new(MemoryStorage::new());
    let (sender, receiver) = crossbeam_channel::bounded(4);
    sender
        .send(ParameterEvent::ActiveMidiChannel { channel: 3 })
        .expect("send failed");
    sender
        .send(ParameterEvent::ActiveMidiChannel { channel: 7 })
        .expect("send failed");
    rig.sequencer.process_parameter_events(&receiver);
    assert_eq!(7, rig.sequencer.active_midi_channel());
    assert!(receiver.is_empty());
}
