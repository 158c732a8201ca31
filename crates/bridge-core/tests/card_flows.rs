//! End-to-end card flows over a scripted mock transport.
//!
//! The mock behaves like a minimal card file system: SELECT always
//! succeeds, READ BINARY serves slices of a fixture certificate file,
//! VERIFY answers with a configurable status word, and the signature
//! command returns a fixed blob. Every command is logged so tests can
//! assert on what was (and was not) sent.

use std::sync::{Arc, Mutex};

use idcard_bridge_core::{CardSession, CryptoAp, Error, KeySlot, TransportAdapter};

const PIN: &[u8] = b"1234";
const SIGNATURE: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

const INS_VERIFY: u8 = 0x20;
const INS_COMPUTE_SIGNATURE: u8 = 0x2A;
const INS_SELECT: u8 = 0xA4;

#[derive(Clone)]
struct Script {
    /// Raw response (data + status word) returned for every VERIFY.
    verify_response: Vec<u8>,

    /// Content of whichever certificate file gets selected.
    cert_file: Vec<u8>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            verify_response: vec![0x90, 0x00],
            cert_file: der_certificate(300),
        }
    }
}

/// Builds a DER-framed fixture file: a SEQUENCE header declaring
/// `content_len` bytes, followed by that many counting bytes.
fn der_certificate(content_len: usize) -> Vec<u8> {
    let mut file = vec![0x30, 0x82, (content_len >> 8) as u8, content_len as u8];
    file.extend((0..content_len).map(|i| i as u8));
    file
}

fn respond(script: &Script, command: &[u8]) -> Vec<u8> {
    let (cla, ins, p1, p2) = (command[0], command[1], command[2], command[3]);

    match (cla, ins) {
        (0x00, INS_SELECT) => vec![0x90, 0x00],
        (0x00, INS_VERIFY) => script.verify_response.clone(),
        (0x00, 0xB0) => {
            let offset = u16::from_be_bytes([p1, p2]) as usize;
            let le = match command.get(4) {
                Some(0) | None => 256,
                Some(&n) => n as usize,
            };
            let end = script.cert_file.len().min(offset + le);
            let mut response = script.cert_file.get(offset..end).unwrap_or(&[]).to_vec();
            response.extend_from_slice(&[0x90, 0x00]);
            response
        }
        (0x80, INS_COMPUTE_SIGNATURE) => {
            let mut response = SIGNATURE.to_vec();
            response.extend_from_slice(&[0x90, 0x00]);
            response
        }
        _ => vec![0x6D, 0x00],
    }
}

type CommandLog = Arc<Mutex<Vec<Vec<u8>>>>;

fn scripted_session(script: Script) -> (CardSession, CommandLog) {
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&log);

    let adapter = TransportAdapter::from_fn(move |command: &[u8]| {
        recorder.lock().unwrap().push(command.to_vec());
        Ok(respond(&script, command))
    });

    (CardSession::new(adapter), log)
}

fn count_ins(log: &CommandLog, cla: u8, ins: u8) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|cmd| cmd.len() >= 2 && cmd[0] == cla && cmd[1] == ins)
        .count()
}

fn selected_files(log: &CommandLog) -> Vec<Vec<u8>> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|cmd| cmd.len() > 5 && cmd[1] == INS_SELECT && cmd[2] == 0x02)
        .map(|cmd| cmd[5..].to_vec())
        .collect()
}

#[test]
fn read_certificate_sign_returns_full_file() {
    let script = Script::default();
    let expected = script.cert_file.clone();
    let (session, log) = scripted_session(script);

    let ap = CryptoAp::open(&session).unwrap();
    let certificate = ap.read_certificate_sign(PIN, false).unwrap();

    assert_eq!(certificate, expected);
    assert_eq!(count_ins(&log, 0x00, INS_VERIFY), 1);
    // Chunked retrieval: the 304-byte file needs the header probe plus two
    // data reads.
    assert_eq!(count_ins(&log, 0x00, 0xB0), 3);
}

#[test]
fn read_certificate_sign_ca_selects_ca_file() {
    let (session, log) = scripted_session(Script::default());

    let ap = CryptoAp::open(&session).unwrap();
    ap.read_certificate_sign(PIN, true).unwrap();

    let selected = selected_files(&log);
    assert!(selected.contains(&vec![0x00, 0x02]));
    assert!(!selected.contains(&vec![0x00, 0x01]));
}

#[test]
fn read_certificate_auth_issues_no_verify() {
    let (session, log) = scripted_session(Script::default());

    let ap = CryptoAp::open(&session).unwrap();
    let certificate = ap.read_certificate_auth(false).unwrap();

    assert!(!certificate.is_empty());
    assert_eq!(count_ins(&log, 0x00, INS_VERIFY), 0);
    assert!(selected_files(&log).contains(&vec![0x00, 0x0A]));
}

#[test]
fn sign_returns_signature() {
    let (session, log) = scripted_session(Script::default());

    let ap = CryptoAp::open(&session).unwrap();
    let signature = ap.sign(PIN, &[0x11; 32]).unwrap();

    assert_eq!(signature, SIGNATURE);
    // Signing key file selected after the PIN file.
    assert!(selected_files(&log).contains(&vec![0x00, 0x1A]));
}

#[test]
fn auth_uses_authentication_slot() {
    let (session, log) = scripted_session(Script::default());

    let ap = CryptoAp::open(&session).unwrap();
    let signature = ap.auth(PIN, &[0x22; 32]).unwrap();

    assert_eq!(signature, SIGNATURE);
    let selected = selected_files(&log);
    assert!(selected.contains(&vec![0x00, 0x18]));
    assert!(selected.contains(&vec![0x00, 0x17]));
}

#[test]
fn wrong_pin_reports_remaining_attempts_and_skips_signing() {
    let script = Script {
        verify_response: vec![0x63, 0xC2],
        ..Script::default()
    };
    let (session, log) = scripted_session(script);

    let ap = CryptoAp::open(&session).unwrap();
    let err = ap.sign(PIN, &[0x11; 32]).unwrap_err();

    assert!(matches!(err, Error::PinVerification { remaining: 2 }));
    assert_eq!(count_ins(&log, 0x80, INS_COMPUTE_SIGNATURE), 0);
}

#[test]
fn lockout_latches_per_slot_without_further_verifies() {
    let script = Script {
        verify_response: vec![0x69, 0x83],
        ..Script::default()
    };
    let (session, log) = scripted_session(script);

    let ap = CryptoAp::open(&session).unwrap();

    // First attempt observes the lock.
    assert!(matches!(ap.sign(PIN, &[0x11; 32]), Err(Error::PinLocked)));
    assert_eq!(count_ins(&log, 0x00, INS_VERIFY), 1);

    // Later attempts on the same slot short-circuit.
    assert!(matches!(ap.sign(PIN, &[0x11; 32]), Err(Error::PinLocked)));
    assert!(matches!(
        ap.read_certificate_sign(PIN, false),
        Err(Error::PinLocked)
    ));
    assert_eq!(count_ins(&log, 0x00, INS_VERIFY), 1);

    // The authentication slot latches independently.
    assert!(matches!(ap.auth(PIN, &[0x22; 32]), Err(Error::PinLocked)));
    assert_eq!(count_ins(&log, 0x00, INS_VERIFY), 2);
    assert!(matches!(ap.auth(PIN, &[0x22; 32]), Err(Error::PinLocked)));
    assert_eq!(count_ins(&log, 0x00, INS_VERIFY), 2);

    assert_eq!(count_ins(&log, 0x80, INS_COMPUTE_SIGNATURE), 0);
}

#[test]
fn pin_remaining_probes_counter() {
    let script = Script {
        verify_response: vec![0x63, 0xC3],
        ..Script::default()
    };
    let (session, _log) = scripted_session(script);

    let ap = CryptoAp::open(&session).unwrap();
    assert_eq!(ap.pin_remaining(KeySlot::Sign).unwrap(), Some(3));
}

#[test]
fn double_close_is_noop_and_operations_fail_after() {
    let (session, log) = scripted_session(Script::default());
    let ap = CryptoAp::open(&session).unwrap();

    session.close();
    session.close();

    let before = log.lock().unwrap().len();
    let err = ap.sign(PIN, &[0x11; 32]).unwrap_err();
    assert!(matches!(err, Error::UseAfterClose));
    let err = ap.read_certificate_auth(false).unwrap_err();
    assert!(matches!(err, Error::UseAfterClose));

    // Nothing reached the transport after close.
    assert_eq!(log.lock().unwrap().len(), before);
}

#[test]
fn open_on_closed_session_attempts_no_exchange() {
    let (session, log) = scripted_session(Script::default());
    session.close();

    let err = CryptoAp::open(&session).unwrap_err();

    assert!(matches!(err, Error::UseAfterClose));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn transport_errors_surface_unretried() {
    let attempts = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&attempts);
    let adapter = TransportAdapter::from_fn(move |_cmd: &[u8]| {
        *counter.lock().unwrap() += 1;
        Err(Error::Transport("card moved out of field".to_string()))
    });
    let session = CardSession::new(adapter);

    let err = CryptoAp::open(&session).unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(*attempts.lock().unwrap(), 1);
}
