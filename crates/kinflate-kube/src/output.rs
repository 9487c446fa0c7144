//! Writing transformed resources
//!
//! Four sinks are supported:
//! - a stream (stdout in plugin mode), documents separated by `---`
//! - a single file
//! - a directory holding one file per resource
//! - a directory plus a `kustomization.yaml` listing every file

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{KubeError, Result};
use crate::resource::Resource;

/// Name of the index written next to per-resource files
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// Where rendered resources go
pub enum OutputTarget {
    Stream(Box<dyn Write + Send>),
    File { path: PathBuf, replace: bool },
    Directory { dir: PathBuf, replace: bool },
    Kustomization { dir: PathBuf, replace: bool },
}

impl std::fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::Stream(_) => f.write_str("Stream"),
            OutputTarget::File { path, replace } => f
                .debug_struct("File")
                .field("path", path)
                .field("replace", replace)
                .finish(),
            OutputTarget::Directory { dir, replace } => f
                .debug_struct("Directory")
                .field("dir", dir)
                .field("replace", replace)
                .finish(),
            OutputTarget::Kustomization { dir, replace } => f
                .debug_struct("Kustomization")
                .field("dir", dir)
                .field("replace", replace)
                .finish(),
        }
    }
}

impl OutputTarget {
    /// Pick a sink from the `--output` argument.
    ///
    /// Empty or `-` selects the stream, a trailing `/` selects a directory
    /// with a kustomization, anything else a single file.
    pub fn from_path(
        path: &str,
        replace: bool,
        stream: Option<Box<dyn Write + Send>>,
    ) -> Result<Self> {
        if path.is_empty() || path == "-" {
            let stream = stream.ok_or_else(|| {
                KubeError::InvalidOutput("neither output file nor writer specified".to_string())
            })?;
            if replace {
                return Err(KubeError::InvalidOutput(
                    "output replacement cannot be enabled when writing to writer".to_string(),
                ));
            }
            return Ok(OutputTarget::Stream(stream));
        }

        if path.ends_with('/') || path.ends_with(std::path::MAIN_SEPARATOR) {
            let dir = PathBuf::from(path.trim_end_matches(['/', std::path::MAIN_SEPARATOR]));
            return Ok(OutputTarget::Kustomization { dir, replace });
        }

        Ok(OutputTarget::File {
            path: PathBuf::from(path),
            replace,
        })
    }

    /// Write every resource; consumes the target so it runs once
    pub fn write(self, resources: &[Resource]) -> Result<()> {
        match self {
            OutputTarget::Stream(mut writer) => {
                let stream = marshal(resources)?;
                writer
                    .write_all(stream.as_bytes())
                    .and_then(|_| writer.flush())
                    .map_err(|e| KubeError::io("write output", e))
            }
            OutputTarget::File { path, replace } => {
                let stream = marshal(resources)?;
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    create_dir(parent)
                        .map_err(|e| KubeError::io(format!("create {}", parent.display()), e))?;
                }
                write_file(&path, stream.as_bytes(), replace)
            }
            OutputTarget::Directory { dir, replace } => {
                write_directory(&dir, resources, replace).map(|_| ())
            }
            OutputTarget::Kustomization { dir, replace } => {
                let files = write_directory(&dir, resources, replace)?;
                write_kustomization(&dir, files)
            }
        }
    }
}

/// Serialize resources as a multi-document YAML stream
pub fn marshal(resources: &[Resource]) -> Result<String> {
    let documents = resources
        .iter()
        .map(Resource::to_yaml)
        .collect::<Result<Vec<_>>>()?;
    Ok(documents.join("---\n"))
}

/// `<lowercased-kind>_<name>.yaml`
pub fn resource_file_name(resource: &Resource) -> Result<String> {
    if resource.meta.name.is_empty() {
        return Err(KubeError::ResourceWithoutName {
            content: resource
                .to_yaml()
                .unwrap_or_default()
                .trim_end()
                .replace('\n', "\n  "),
        });
    }
    if resource.meta.name.contains(['/', '\\']) {
        return Err(KubeError::UnsafeResourceName {
            kind: resource.meta.kind.clone(),
            name: resource.meta.name.clone(),
        });
    }
    Ok(format!(
        "{}_{}.yaml",
        resource.meta.kind.to_lowercase(),
        resource.meta.name
    ))
}

fn write_directory(dir: &Path, resources: &[Resource], replace: bool) -> Result<Vec<String>> {
    let display = dir.display().to_string();
    if replace {
        match fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(KubeError::io(format!("remove {}", display), e)),
        }
    } else if contains_files(dir)? {
        return Err(KubeError::OutputDirNotEmpty { path: display });
    }
    create_dir(dir).map_err(|e| KubeError::io(format!("create {}", display), e))?;

    let mut files = Vec::with_capacity(resources.len());
    for resource in resources {
        let name = resource_file_name(resource)?;
        write_file(&dir.join(&name), resource.to_yaml()?.as_bytes(), false)?;
        files.push(name);
    }
    Ok(files)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Kustomization {
    api_version: &'static str,
    kind: &'static str,
    resources: Vec<String>,
}

fn write_kustomization(dir: &Path, resources: Vec<String>) -> Result<()> {
    let kustomization = Kustomization {
        api_version: "kustomize.config.k8s.io/v1beta1",
        kind: "Kustomization",
        resources,
    };
    let content = serde_yaml::to_string(&kustomization)?;
    write_file(&dir.join(KUSTOMIZATION_FILE), content.as_bytes(), false)
}

fn contains_files(dir: &Path) -> Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(KubeError::io(format!("read {}", dir.display()), e)),
    }
}

fn create_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o750);
    }
    builder.create(dir)
}

/// Write a file, either creating it exclusively or truncating it
fn write_file(path: &Path, content: &[u8], replace: bool) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if replace {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }

    let mut file = options.open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            KubeError::OutputFileExists {
                path: path.display().to_string(),
            }
        } else {
            KubeError::io(format!("open output file {}", path.display()), e)
        }
    })?;
    file.write_all(content)
        .map_err(|e| KubeError::io(format!("write {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::parse_documents;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn sample() -> Vec<Resource> {
        parse_documents(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
        )
        .unwrap()
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream() {
        let buf = SharedBuf::default();
        let target = OutputTarget::from_path("", false, Some(Box::new(buf.clone()))).unwrap();
        target.write(&sample()).unwrap();
        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("---\n").count(), 1);
        assert!(text.starts_with("apiVersion: v1\nkind: ConfigMap"));
        assert_eq!(parse_documents(&text).unwrap(), sample());
    }

    #[test]
    fn test_stream_rejects_replace() {
        let err = OutputTarget::from_path("-", true, Some(Box::new(SharedBuf::default())))
            .unwrap_err();
        assert!(err.to_string().contains("output replacement cannot be enabled"));
        assert!(OutputTarget::from_path("", false, None).is_err());
    }

    #[test]
    fn test_file_exclusive_then_replace() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.yaml");
        let path_str = path.to_str().unwrap();

        OutputTarget::from_path(path_str, false, None)
            .unwrap()
            .write(&sample())
            .unwrap();
        let err = OutputTarget::from_path(path_str, false, None)
            .unwrap()
            .write(&sample()[..1])
            .unwrap_err();
        assert!(matches!(err, KubeError::OutputFileExists { .. }));

        OutputTarget::from_path(path_str, true, None)
            .unwrap()
            .write(&sample()[..1])
            .unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("Deployment"));
    }

    #[test]
    fn test_file_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("build/manifests/out.yaml");

        OutputTarget::from_path(path.to_str().unwrap(), false, None)
            .unwrap()
            .write(&sample())
            .unwrap();
        assert_eq!(
            parse_documents(&fs::read_to_string(&path).unwrap()).unwrap(),
            sample()
        );
    }

    #[test]
    fn test_kustomization_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("out");
        let arg = format!("{}/", dir.display());

        let target = OutputTarget::from_path(&arg, false, None).unwrap();
        assert!(matches!(target, OutputTarget::Kustomization { .. }));
        target.write(&sample()).unwrap();

        assert!(dir.join("configmap_cfg.yaml").exists());
        assert!(dir.join("deployment_web.yaml").exists());
        let index: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(dir.join(KUSTOMIZATION_FILE)).unwrap())
                .unwrap();
        assert_eq!(index["apiVersion"].as_str(), Some("kustomize.config.k8s.io/v1beta1"));
        assert_eq!(index["kind"].as_str(), Some("Kustomization"));
        assert_eq!(index["resources"][0].as_str(), Some("configmap_cfg.yaml"));
        assert_eq!(index["resources"][1].as_str(), Some("deployment_web.yaml"));

        let err = OutputTarget::from_path(&arg, false, None)
            .unwrap()
            .write(&sample())
            .unwrap_err();
        assert!(matches!(err, KubeError::OutputDirNotEmpty { .. }));

        fs::write(dir.join("stale.yaml"), "x").unwrap();
        OutputTarget::from_path(&arg, true, None)
            .unwrap()
            .write(&sample()[..1])
            .unwrap();
        assert!(!dir.join("stale.yaml").exists());
        assert!(!dir.join("deployment_web.yaml").exists());
        assert!(dir.join("configmap_cfg.yaml").exists());
    }

    #[test]
    fn test_directory_without_index() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("plain");
        OutputTarget::Directory {
            dir: dir.clone(),
            replace: false,
        }
        .write(&sample())
        .unwrap();
        assert!(dir.join("configmap_cfg.yaml").exists());
        assert!(!dir.join(KUSTOMIZATION_FILE).exists());
    }

    #[test]
    fn test_resource_without_name() {
        let tmp = TempDir::new().unwrap();
        let nameless = parse_documents("apiVersion: v1\nkind: ConfigMap\n").unwrap();
        let err = OutputTarget::Directory {
            dir: tmp.path().join("d"),
            replace: false,
        }
        .write(&nameless)
        .unwrap_err();
        assert!(matches!(err, KubeError::ResourceWithoutName { .. }));
    }

    #[test]
    fn test_resource_name_with_separator() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("d");
        let escaping =
            parse_documents("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: ../../evil\n")
                .unwrap();
        let err = OutputTarget::Directory {
            dir: dir.clone(),
            replace: false,
        }
        .write(&escaping)
        .unwrap_err();
        assert!(matches!(err, KubeError::UnsafeResourceName { .. }));
        assert!(!tmp.path().join("evil.yaml").exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_modes() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("m");
        OutputTarget::Directory {
            dir: dir.clone(),
            replace: false,
        }
        .write(&sample())
        .unwrap();
        let file_mode = fs::metadata(dir.join("configmap_cfg.yaml"))
            .unwrap()
            .permissions()
            .mode();
        // umask may only clear bits
        assert_eq!(file_mode & 0o137, 0);
    }
}
