//! End-to-end tests driving the `kinflate` binary against the fixture charts

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_yaml::Value;
use tempfile::TempDir;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// A scratch project holding a copy of the fixtures; dependency builds write into it
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    copy_dir(&fixtures(), dir.path());
    dir
}

fn kinflate(project: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kinflate"));
    cmd.current_dir(project)
        .env("KINFLATE_REPOSITORY_CONFIG", project.join("home/repositories.yaml"))
        .env("KINFLATE_REPOSITORY_CACHE", project.join("home/cache"))
        .env_remove("KINFLATE_TRUST_ANY_REPO")
        .env_remove("KINFLATE_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn documents(stream: &[u8]) -> Vec<Value> {
    let text = String::from_utf8_lossy(stream);
    serde_yaml::Deserializer::from_str(&text)
        .map(|doc| serde::Deserialize::deserialize(doc).unwrap())
        .collect()
}

fn kinds(docs: &[Value]) -> Vec<&str> {
    docs.iter().map(|d| d["kind"].as_str().unwrap()).collect()
}

#[test]
fn template_local_chart_with_subchart() {
    let project = project();
    let output = kinflate(project.path())
        .args(["template", "charts/webapp", "--name", "web", "-n", "apps"])
        .args(["--force-namespace", "apps", "--set", "replicas=3"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let docs = documents(&output.stdout);
    // hook job dropped, NOTES.txt and the disabled ClusterRole produce nothing
    assert_eq!(kinds(&docs), ["ConfigMap", "ConfigMap", "Service", "Deployment"]);
    assert!(docs.iter().all(|d| d["metadata"]["namespace"] == "apps"));

    let deployment = &docs[3];
    assert_eq!(deployment["metadata"]["name"], "web-webapp");
    assert_eq!(deployment["spec"]["replicas"], 3);
    assert!(
        deployment["metadata"]["labels"]
            .get("app.kubernetes.io/managed-by")
            .is_none()
    );
    assert!(
        deployment["spec"]["template"]["metadata"]["labels"]
            .get("app.kubernetes.io/managed-by")
            .is_none()
    );

    let redis = &docs[1];
    assert_eq!(redis["metadata"]["name"], "web-redis");
    assert_eq!(redis["data"]["maxmemory"], "64mb");
    assert_eq!(redis["data"]["team"], "platform");

    // the local dependency was packed into charts/ and locked
    let chart_dir = project.path().join("charts/webapp");
    assert!(chart_dir.join("charts/redis-0.1.0.tgz").exists());
    assert!(chart_dir.join("Chart.lock").exists());
    assert!(!chart_dir.join("tmpcharts").exists());
}

#[test]
fn template_keeps_hooks_when_asked() {
    let project = project();
    let output = kinflate(project.path())
        .args(["template", "charts/webapp", "--include-hooks", "--set", "redis.enabled=false"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        kinds(&documents(&output.stdout)),
        ["ConfigMap", "Service", "Deployment", "Job"]
    );
}

#[test]
fn generate_from_stdin_into_kustomization_dir() {
    let project = project();
    let config = fs::read_to_string(project.path().join("generator.yaml")).unwrap();

    let mut cmd = kinflate(project.path());
    cmd.args(["generate", "-", "--output", "out/"]);
    let output = run_with_stdin(cmd, &config);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output.stdout.is_empty());

    let out = project.path().join("out");
    let kustomization: Value =
        serde_yaml::from_str(&fs::read_to_string(out.join("kustomization.yaml")).unwrap())
            .unwrap();
    assert_eq!(kustomization["kind"], "Kustomization");
    let resources: Vec<&str> = kustomization["resources"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap())
        .collect();
    assert_eq!(
        resources,
        [
            "configmap_web-webapp-config.yaml",
            "configmap_web-redis.yaml",
            "deployment_web-webapp.yaml",
        ]
    );

    let deployment: Value =
        serde_yaml::from_str(&fs::read_to_string(out.join("deployment_web-webapp.yaml")).unwrap())
            .unwrap();
    assert_eq!(deployment["spec"]["replicas"], 4);

    // a second run must not touch the populated directory
    let mut cmd = kinflate(project.path());
    cmd.args(["generate", "-", "--output", "out/"]);
    let output = run_with_stdin(cmd, &config);
    assert_eq!(output.status.code(), Some(5));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--output-replace"));
    assert_eq!(fs::read_dir(&out).unwrap().count(), 4);
}

#[test]
fn generate_reports_every_config_error() {
    let project = project();
    let config = "apiVersion: kinflate.dev/v1\nkind: ChartRenderer\nmetadata:\n  name: broken\ninclude:\n  - {}\nkubeVersion: latest\n";

    let mut cmd = kinflate(project.path());
    cmd.arg("generate");
    let output = run_with_stdin(cmd, config);
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid chart renderer config"));
    assert!(stderr.contains("chart not specified"));
    assert!(stderr.contains("include[0]"));
    assert!(stderr.contains("kubeVersion"));
}

#[test]
fn namespaced_only_rejects_cluster_scoped_resources() {
    let project = project();
    let output = kinflate(project.path())
        .args(["template", "charts/webapp", "--namespaced-only", "--set", "rbac.create=true"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(6));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cluster-scoped"));
    assert!(stderr.contains("ClusterRole"));
}

#[test]
fn output_file_conflict() {
    let project = project();
    let target = project.path().join("rendered.yaml");
    fs::write(&target, "keep me\n").unwrap();

    let output = kinflate(project.path())
        .args(["template", "charts/webapp", "-o", "rendered.yaml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5));
    assert_eq!(fs::read_to_string(&target).unwrap(), "keep me\n");

    let output = kinflate(project.path())
        .args(["template", "charts/webapp", "-o", "rendered.yaml", "--output-replace"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(kinds(&documents(&fs::read(&target).unwrap())).len(), 4);
}

#[test]
fn template_error_exit_code() {
    let project = project();
    fs::write(
        project.path().join("charts/webapp/templates/broken.yaml"),
        "value: {{ values.name | required('name is required') }}\n",
    )
    .unwrap();

    let output = kinflate(project.path())
        .args(["template", "charts/webapp"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("render chart webapp 1.2.0"));
    assert!(stderr.contains("name is required"));
}

#[test]
fn unconfigured_repository_needs_trust() {
    let project = project();
    let output = kinflate(project.path())
        .args(["template", "nginx", "--repo", "http://127.0.0.1:9/charts"])
        .args(["--chart-version", "1.0.0"])
        .env("KINFLATE_TRUST_ANY_REPO", "false")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("is not configured"));
}

#[test]
fn repo_add_failure_leaves_config_untouched() {
    let project = project();
    let output = kinflate(project.path())
        .args(["repo", "add", "local", "http://127.0.0.1:9/charts"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let output = kinflate(project.path()).args(["repo", "list"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No repositories configured"));

    let output = kinflate(project.path())
        .args(["repo", "remove", "local"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("repository not found: local"));
}
