#[test]
fn help_lists_commands_and_connection_flags() {
    let output = std::process::Command::new(assert_cmd::cargo::cargo_bin!("cqlsync"))
        .arg("--help")
        .output()
        .expect("run help");
    assert!(output.status.success(), "--help should succeed");
    let text = String::from_utf8_lossy(&output.stdout);

    for needle in ["apply", "plan", "probe", "--json", "--host", "--connection-tries"] {
        assert!(
            text.contains(needle),
            "help output should contain '{needle}'"
        );
    }
}

#[test]
fn apply_help_mentions_keep_going() {
    let output = std::process::Command::new(assert_cmd::cargo::cargo_bin!("cqlsync"))
        .args(["apply", "--help"])
        .output()
        .expect("run apply help");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("--keep-going"), "{text}");
}
