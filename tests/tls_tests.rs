use std::path::PathBuf;

use droopy::config::TlsSettings;
use droopy::tls::{load_acceptor, permitted_suites, TlsError, DEFAULT_CIPHERS};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_default_ciphers_are_all_available() {
    let suites = permitted_suites(&names(DEFAULT_CIPHERS)).unwrap();
    assert_eq!(suites.len(), DEFAULT_CIPHERS.len());
}

#[test]
fn test_cipher_names() {
    // case-insensitive, duplicates collapse
    let suites = permitted_suites(&names(&[
        "tls13_aes_128_gcm_sha256",
        "TLS13_AES_128_GCM_SHA256",
    ]))
    .unwrap();
    assert_eq!(suites.len(), 1);

    assert!(matches!(
        permitted_suites(&names(&["TLS_RSA_WITH_RC4_128_MD5"])),
        Err(TlsError::UnknownCipher(name)) if name == "TLS_RSA_WITH_RC4_128_MD5"
    ));
    assert!(matches!(permitted_suites(&names(&[" ", ""])), Err(TlsError::NoCiphers)));
}

#[test]
fn test_load_acceptor_rejects_bad_pem() {
    let dir = tempfile::tempdir().unwrap();
    let pem = dir.path().join("cert.pem");
    std::fs::write(&pem, "this is not a certificate").unwrap();

    let settings = TlsSettings {
        cert_path: pem,
        ciphers: names(DEFAULT_CIPHERS),
    };
    assert!(matches!(load_acceptor(&settings), Err(TlsError::NoCertificate(_))));

    let settings = TlsSettings {
        cert_path: PathBuf::from("/definitely/not/here.pem"),
        ciphers: names(DEFAULT_CIPHERS),
    };
    assert!(matches!(load_acceptor(&settings), Err(TlsError::Read { .. })));
}
