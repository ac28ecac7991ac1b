//! Integration tests for token logins against software tokens

use std::collections::HashMap;
use std::fs;

use tempfile::{tempdir, TempDir};
use tokenlogin::{
    verify, Expectation, LoginError, LoginSession, LoginStage, LoginState, Mismatch,
    SoftTokenStore,
};
use tokenlogin_core::{
    escape_properties_value, normalize, ConfigLayers, LoginMode, PinSource, Properties, RawPin,
    ResolvedCredentials, StorePath, STORE_PATH_KEY, STORE_PIN_KEY,
};

const NON_ASCII_PIN: &str = "1234567890abcdef1234567890ABCDEF\u{A4F7}";
const PIN_ENV_VAR: &str = "NSSDB_PIN_ENV_VAR";

struct Workspace {
    dir: TempDir,
    store_path: String,
    pin_file: std::path::PathBuf,
}

/// Provision a token with `pin` and write a PIN file with a garbage second line
fn workspace(pin: &str) -> Workspace {
    let dir = tempdir().unwrap();
    let token_dir = dir.path().join("db");
    SoftTokenStore::provision(&token_dir, "Test Token", &RawPin::new(pin)).unwrap();

    let pin_file = dir.path().join("pin.txt");
    fs::write(&pin_file, format!("{}\n2nd line with garbage", pin)).unwrap();

    Workspace {
        store_path: format!("sql:{}", token_dir.display()),
        pin_file,
        dir,
    }
}

fn props(entries: &[(&str, &str)]) -> Properties {
    let mut p = Properties::new();
    for (k, v) in entries {
        p.set(*k, *v);
    }
    p
}

fn env(pin: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(PIN_ENV_VAR.to_string(), pin.to_string());
    env
}

/// Run an implicit login plus probe and verify the outcome
fn implicit_login_roundtrip(
    ws: &Workspace,
    layers: ConfigLayers,
    env: &HashMap<String, String>,
    pin: &str,
    source: PinSource,
) {
    let credentials = layers.resolve(env);
    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);

    session.probe().unwrap();

    let expectation = Expectation::new(StorePath::new(&ws.store_path), source, LoginMode::Implicit)
        .with_pin(RawPin::new(pin));
    verify(&expectation, &session.inspect()).unwrap();
}

fn pin_descriptors(ws: &Workspace, pin: &str) -> Vec<(String, PinSource)> {
    vec![
        (format!("pin:{}", pin), PinSource::Config),
        (format!("env:{}", PIN_ENV_VAR), PinSource::Environment),
        (format!("file:{}", ws.pin_file.display()), PinSource::File),
    ]
}

#[test]
fn test_implicit_login_system_layer() {
    for pin in ["", NON_ASCII_PIN] {
        let ws = workspace(pin);
        for (descriptor, source) in pin_descriptors(&ws, pin) {
            // Blank security values so provider defaults are not used
            let layers = ConfigLayers::new(
                props(&[
                    (STORE_PATH_KEY, ws.store_path.as_str()),
                    (STORE_PIN_KEY, descriptor.as_str()),
                ]),
                props(&[(STORE_PATH_KEY, ""), (STORE_PIN_KEY, "")]),
            );
            implicit_login_roundtrip(&ws, layers, &env(pin), pin, source);
        }
    }
}

#[test]
fn test_implicit_login_security_properties_file() {
    for pin in ["", NON_ASCII_PIN] {
        let ws = workspace(pin);
        for (descriptor, source) in pin_descriptors(&ws, pin) {
            let text = format!(
                "{}={}\n{}={}\n",
                STORE_PATH_KEY,
                escape_properties_value(&ws.store_path),
                STORE_PIN_KEY,
                escape_properties_value(&descriptor)
            );
            assert!(text.is_ascii());

            let security_file = ws.dir.path().join("security.properties");
            fs::write(&security_file, &text).unwrap();
            let parsed = Properties::parse(&fs::read_to_string(&security_file).unwrap()).unwrap();

            let layers = ConfigLayers::security_only(parsed);
            implicit_login_roundtrip(&ws, layers, &env(pin), pin, source);
        }
    }
}

#[test]
fn test_empty_pin_scenario() {
    let ws = workspace("");
    let layers = ConfigLayers::system_only(props(&[
        (STORE_PATH_KEY, ws.store_path.as_str()),
        (STORE_PIN_KEY, "pin:"),
    ]));
    let credentials = layers.resolve(&HashMap::new());

    assert_eq!(credentials.pin_source(), PinSource::Config);
    let pin = credentials.resolution.pin().unwrap();
    assert!(pin.is_empty());
    assert_eq!(normalize(pin).len(), 0);

    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);
    let ciphertext = session.encrypt_ecb(&[0u8; 16], &[0u8; 16]).unwrap();
    assert_eq!(ciphertext.len(), 16);
    assert_eq!(session.state(), LoginState::Unlocked);
    assert_eq!(session.mode(), Some(LoginMode::Implicit));
}

#[test]
fn test_explicit_login_ignores_wrong_configured_pin() {
    for pin in ["", NON_ASCII_PIN] {
        let ws = workspace(pin);
        let layers = ConfigLayers::new(
            props(&[
                (STORE_PATH_KEY, ws.store_path.as_str()),
                (STORE_PIN_KEY, "Invalid PIN, must be ignored"),
            ]),
            props(&[(STORE_PATH_KEY, ""), (STORE_PIN_KEY, "")]),
        );
        let credentials = layers.resolve(&HashMap::new());
        let mut session = LoginSession::new(SoftTokenStore::new(), credentials);

        session.login_explicit(&RawPin::new(pin)).unwrap();
        session.probe().unwrap();

        let inspection = session.inspect();
        assert_eq!(inspection.mode(), Some(LoginMode::Explicit));
        assert_eq!(inspection.state(), LoginState::Unlocked);
        assert_eq!(inspection.pin_source(), PinSource::Config);
        assert!(inspection.resolved_pin_matches(Some("Invalid PIN, must be ignored")));

        let expectation =
            Expectation::new(StorePath::new(&ws.store_path), PinSource::Config, LoginMode::Explicit);
        verify(&expectation, &inspection).unwrap();
    }
}

#[test]
fn test_non_ascii_explicit_login() {
    let ws = workspace(NON_ASCII_PIN);
    let pin = RawPin::new(NON_ASCII_PIN);

    let encoded = normalize(&pin);
    assert_eq!(encoded.len(), NON_ASCII_PIN.len());
    assert_eq!(&encoded.units()[32..], &[0xEA, 0x93, 0xB7]);

    let credentials = ResolvedCredentials::new(
        StorePath::new(&ws.store_path),
        tokenlogin_core::resolve(None, None, None),
    );
    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);
    session.login_explicit(&pin).unwrap();
    assert_eq!(session.token_label(), Some("Test Token"));
}

#[test]
fn test_file_pin_ignores_second_line() {
    let ws = workspace("s3cret");
    let descriptor = format!("file:{}", ws.pin_file.display());
    let layers = ConfigLayers::system_only(props(&[(STORE_PIN_KEY, descriptor.as_str())]));

    let credentials = layers.resolve(&HashMap::new());
    assert_eq!(credentials.pin_source(), PinSource::File);
    assert_eq!(credentials.resolution.pin().unwrap().expose(), "s3cret");
}

#[test]
fn test_defaults_without_configuration() {
    let credentials = ConfigLayers::default().resolve(&HashMap::new());
    assert_eq!(credentials.store_path.as_str(), "sql:/etc/pki/nssdb");
    assert_eq!(credentials.pin_source(), PinSource::None);

    let session = LoginSession::new(SoftTokenStore::new(), credentials);
    let inspection = session.inspect();
    assert_eq!(inspection.state(), LoginState::Idle);
    assert_eq!(inspection.mode(), None);
    assert!(inspection.resolved_pin_matches(None));
}

#[test]
fn test_absent_pin_uses_token_default() {
    // Token provisioned with the empty default PIN, nothing configured
    let ws = workspace("");
    let layers = ConfigLayers::system_only(props(&[(STORE_PATH_KEY, ws.store_path.as_str())]));
    let credentials = layers.resolve(&HashMap::new());
    assert_eq!(credentials.pin_source(), PinSource::None);

    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);
    session.probe().unwrap();

    let expectation =
        Expectation::new(StorePath::new(&ws.store_path), PinSource::None, LoginMode::Implicit);
    verify(&expectation, &session.inspect()).unwrap();
}

#[test]
fn test_wrong_implicit_pin_is_authentication_failure() {
    let ws = workspace("right");
    let layers = ConfigLayers::system_only(props(&[
        (STORE_PATH_KEY, ws.store_path.as_str()),
        (STORE_PIN_KEY, "pin:wrong"),
    ]));
    let mut session = LoginSession::new(SoftTokenStore::new(), layers.resolve(&HashMap::new()));

    let err = session.probe().unwrap_err();
    assert!(matches!(err, LoginError::Authentication(_)));
    assert_eq!(err.stage(), Some(LoginStage::Unlock));
    assert_eq!(session.state(), LoginState::Failed(LoginStage::Unlock));

    // Terminal: no retry through the same session
    let retry = session.login_explicit(&RawPin::new("right")).unwrap_err();
    assert!(matches!(retry, LoginError::InvalidTransition { .. }));
    assert!(session.probe().is_err());
}

#[test]
fn test_wrong_explicit_pin_fails_session() {
    let ws = workspace("right");
    let credentials = ResolvedCredentials::new(
        StorePath::new(&ws.store_path),
        tokenlogin_core::resolve(Some("right"), None, None),
    );
    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);

    let err = session.login_explicit(&RawPin::new("wrong")).unwrap_err();
    assert!(matches!(err, LoginError::Authentication(_)));
    assert_eq!(session.state(), LoginState::Failed(LoginStage::Unlock));
    assert_eq!(session.mode(), Some(LoginMode::Explicit));
}

#[test]
fn test_missing_store_is_initialization_failure() {
    let dir = tempdir().unwrap();
    let credentials = ResolvedCredentials::new(
        StorePath::new(format!("sql:{}", dir.path().join("missing").display())),
        tokenlogin_core::resolve(Some(""), None, None),
    );
    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);

    let err = session.probe().unwrap_err();
    assert!(matches!(err, LoginError::StoreInitialization(_)));
    assert_eq!(session.state(), LoginState::Failed(LoginStage::Initialization));
}

#[test]
fn test_bad_input_is_crypto_operation_failure() {
    let ws = workspace("");
    let credentials = ResolvedCredentials::new(
        StorePath::new(&ws.store_path),
        tokenlogin_core::resolve(Some(""), None, None),
    );
    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);
    session.login_explicit(&RawPin::empty()).unwrap();

    let err = session.encrypt_ecb(&[0u8; 16], &[0u8; 15]).unwrap_err();
    assert!(matches!(err, LoginError::CryptoOperation(_)));
    assert_eq!(session.state(), LoginState::Failed(LoginStage::CryptoOperation));
}

#[test]
fn test_second_explicit_login_is_rejected() {
    let ws = workspace("pin");
    let credentials = ResolvedCredentials::new(
        StorePath::new(&ws.store_path),
        tokenlogin_core::resolve(None, None, None),
    );
    let mut session = LoginSession::new(SoftTokenStore::new(), credentials);
    session.login_explicit(&RawPin::new("pin")).unwrap();

    let err = session.login_explicit(&RawPin::new("pin")).unwrap_err();
    assert!(matches!(
        err,
        LoginError::InvalidTransition {
            state: LoginState::Unlocked,
            ..
        }
    ));
    // Still usable after the rejected call
    session.probe().unwrap();
}

#[test]
fn test_verifier_reports_mismatches_without_pin_values() {
    let ws = workspace("actual-pin");
    let layers = ConfigLayers::system_only(props(&[
        (STORE_PATH_KEY, ws.store_path.as_str()),
        (STORE_PIN_KEY, "pin:actual-pin"),
    ]));
    let mut session = LoginSession::new(SoftTokenStore::new(), layers.resolve(&HashMap::new()));
    session.probe().unwrap();

    let expectation = Expectation::new(
        StorePath::new("sql:/elsewhere"),
        PinSource::Environment,
        LoginMode::Explicit,
    )
    .with_pin(RawPin::new("expected-pin"));

    let err = verify(&expectation, &session.inspect()).unwrap_err();
    assert_eq!(err.mismatches.len(), 4);
    assert!(err.mismatches.contains(&Mismatch::Pin));

    let message = err.to_string();
    assert!(!message.contains("actual-pin"));
    assert!(!message.contains("expected-pin"));
    assert!(message.contains("sql:/elsewhere"));
}
