use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn accounts_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "name, balance").unwrap();
    writeln!(file, "foo, 1000").unwrap();
    writeln!(file, "bar, 1000").unwrap();
    file
}

#[test]
fn test_sample_routes() {
    let accounts = accounts_file();
    let mut messages = NamedTempFile::new().unwrap();
    writeln!(messages, "queue, amount").unwrap();
    writeln!(messages, "transaction.incoming.one, 100").unwrap();
    writeln!(messages, "transaction.incoming.two, 100").unwrap();
    writeln!(messages, "transaction.incoming.three, 100").unwrap();

    let mut cmd = Command::new(cargo_bin!("txbridge"));
    cmd.arg(accounts.path()).arg(messages.path());

    // Only the first route moves money.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("name,balance"))
        .stdout(predicate::str::contains("bar,1100"))
        .stdout(predicate::str::contains("foo,900"))
        .stderr(predicate::str::contains("forced exception for test"));
}

#[test]
fn test_malformed_message_is_skipped() {
    let accounts = accounts_file();
    let mut messages = NamedTempFile::new().unwrap();
    writeln!(messages, "queue, amount").unwrap();
    writeln!(messages, "transaction.incoming.one, lots").unwrap();
    writeln!(messages, "transaction.incoming.one, 50").unwrap();

    let mut cmd = Command::new(cargo_bin!("txbridge"));
    cmd.arg(accounts.path()).arg(messages.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading message"))
        .stdout(predicate::str::contains("foo,950"));
}

#[test]
fn test_custom_route_config() {
    let accounts = accounts_file();
    let mut messages = NamedTempFile::new().unwrap();
    writeln!(messages, "queue, amount").unwrap();
    writeln!(messages, "payments, 250").unwrap();

    let mut config = NamedTempFile::new().unwrap();
    write!(
        config,
        r#"{{"routes": [{{"name": "reverse", "from": "payments", "steps": [{{"debit": "bar"}}, {{"credit": "foo"}}, {{"to": "settled"}}]}}]}}"#
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("txbridge"));
    cmd.arg(accounts.path())
        .arg(messages.path())
        .arg("--config")
        .arg(config.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("bar,750"))
        .stdout(predicate::str::contains("foo,1250"));
}

#[test]
fn test_invalid_config_fails() {
    let accounts = accounts_file();
    let messages = NamedTempFile::new().unwrap();
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"queues": {{"max_depth": 0}}}}"#).unwrap();

    let mut cmd = Command::new(cargo_bin!("txbridge"));
    cmd.arg(accounts.path())
        .arg(messages.path())
        .arg("--config")
        .arg(config.path());

    cmd.assert().failure();
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let accounts = accounts_file();
    let messages = NamedTempFile::new().unwrap();

    let mut cmd = Command::new(cargo_bin!("txbridge"));
    cmd.arg(accounts.path())
        .arg(messages.path())
        .arg("--db-path")
        .arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back to in-memory storage"));
}
