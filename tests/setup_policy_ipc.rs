mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, sha256_hex, spawn_sidecar, temp_dir};

#[test]
fn policy_defaults_then_patch_persists_across_restart() {
    let workspace = temp_dir("attendanced-setup-policy");
    let path = workspace.to_string_lossy().to_string();

    {
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": path }),
        );

        let got = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
        let policy = &got["policy"];
        assert_eq!(policy["rateLimitWindowMs"], json!(2000));
        assert_eq!(policy["utcOffsetMinutes"], json!(330));
        assert_eq!(policy["maxCommitAttempts"], json!(5));
        assert_eq!(policy["resetBatchSize"], json!(500));
        assert_eq!(policy["adminEmailDomain"], json!("ves.ac.in"));
        assert_eq!(policy["resetSecretConfigured"], json!(false));
        assert!(policy.get("resetSecretSha256").is_none());

        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "setup.update",
            json!({
                "section": "policy",
                "patch": {
                    "rateLimitWindowMs": 500,
                    "adminEmailDomain": "@Example.EDU",
                    "resetSecretSha256": sha256_hex("s3cret")
                }
            }),
        );
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": path }),
    );
    let got = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(got["policy"]["rateLimitWindowMs"], json!(500));
    assert_eq!(got["policy"]["adminEmailDomain"], json!("example.edu"));
    assert_eq!(got["policy"]["resetSecretConfigured"], json!(true));
    assert_eq!(got["policy"]["resetBatchSize"], json!(500));
}

#[test]
fn invalid_patches_are_rejected_without_saving() {
    let workspace = temp_dir("attendanced-setup-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (i, params) in [
        json!({ "section": "policy", "patch": { "resetBatchSize": 501 } }),
        json!({ "section": "policy", "patch": { "maxCommitAttempts": 0 } }),
        json!({ "section": "policy", "patch": { "rateLimitWindowMs": -1 } }),
        json!({ "section": "policy", "patch": { "resetSecretSha256": "abc" } }),
        json!({ "section": "policy", "patch": { "colour": "blue" } }),
        json!({ "section": "grading", "patch": {} }),
        json!({ "section": "policy" }),
        json!({ "patch": {} }),
    ]
    .into_iter()
    .enumerate()
    {
        let id = format!("bad{}", i);
        let _ = request_err(&mut stdin, &mut reader, &id, "setup.update", params, "bad_params");
    }

    let got = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(got["policy"]["resetBatchSize"], json!(500));
    assert_eq!(got["policy"]["maxCommitAttempts"], json!(5));
    assert_eq!(got["policy"]["rateLimitWindowMs"], json!(2000));
}
