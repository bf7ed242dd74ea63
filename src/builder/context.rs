use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;
use ubyte::ToByteUnit;

use crate::builder::dockerignore::{IgnoreMatcher, DOCKERIGNORE};
use crate::util::random;

pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// A build context packed into a temporary tar file.
pub struct ContextArchive {
    file: NamedTempFile,
    /// Path of the Dockerfile inside the archive.
    pub dockerfile: String,
    pub size: u64,
}

impl ContextArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Packs `context_dir` honoring `.dockerignore`.
///
/// `dockerfile` is resolved against the context when relative. A Dockerfile outside the
/// context is added under a random `.dockerfile.*` name.
pub fn create_context(context_dir: &Path, dockerfile: Option<&str>, compress: bool) -> Result<ContextArchive> {
    if !context_dir.is_dir() {
        bail!("unable to prepare context: path {:?} not found or not a directory", context_dir);
    }
    let dockerfile_path = resolve_dockerfile(context_dir, dockerfile)?;
    let mut matcher = IgnoreMatcher::from_context(context_dir)?;

    let (archive_name, external) = match relative_to(&dockerfile_path, context_dir) {
        Some(relative) => (relative, false),
        None => (format!(".dockerfile.{}", random::random_str(20).to_lowercase()), true),
    };
    if !matcher.is_empty() {
        // the daemon needs both files even when they are ignored
        matcher.push(&format!("!{}", DOCKERIGNORE))?;
        if !external {
            matcher.push(&format!("!{}", archive_name))?;
        }
    }
    debug!("Packing build context {} with Dockerfile {}", context_dir.display(), archive_name);

    let temp_file = NamedTempFile::new()?;
    let external_dockerfile = external.then_some((dockerfile_path.as_path(), archive_name.as_str()));
    if compress {
        let mut builder = Builder::new(GzEncoder::new(temp_file.reopen()?, Compression::fast()));
        pack(&mut builder, context_dir, &matcher, external_dockerfile)?;
        builder.into_inner()?.finish()?.flush()?;
    } else {
        let mut builder = Builder::new(temp_file.reopen()?);
        pack(&mut builder, context_dir, &matcher, external_dockerfile)?;
        builder.into_inner()?.flush()?;
    }

    let size = temp_file.as_file().metadata()?.len();
    info!("Sending build context to IBM Cloud Container Registry {}", size.bytes());
    Ok(ContextArchive {
        file: temp_file,
        dockerfile: archive_name,
        size,
    })
}

fn pack<W: Write>(
    builder: &mut Builder<W>,
    context_dir: &Path,
    matcher: &IgnoreMatcher,
    external_dockerfile: Option<(&Path, &str)>,
) -> Result<()> {
    builder.follow_symlinks(false);
    append_dir_entries(builder, context_dir, "", matcher)?;
    if let Some((path, name)) = external_dockerfile {
        let mut dockerfile_file = File::open(path)?;
        builder.append_file(name, &mut dockerfile_file)?;
    }
    builder.finish()?;
    Ok(())
}

fn resolve_dockerfile(context_dir: &Path, dockerfile: Option<&str>) -> Result<PathBuf> {
    let path = match dockerfile.filter(|file| !file.is_empty()) {
        None => context_dir.join(DEFAULT_DOCKERFILE),
        Some(file) if Path::new(file).is_absolute() => PathBuf::from(file),
        Some(file) => context_dir.join(file),
    };
    if !path.is_file() {
        bail!("Cannot locate specified Dockerfile: {}", path.display());
    }
    Ok(path)
}

/// Slash separated path of `path` below `base`, if it is inside it.
fn relative_to(path: &Path, base: &Path) -> Option<String> {
    let path = fs::canonicalize(path).ok()?;
    let base = fs::canonicalize(base).ok()?;
    let relative = path.strip_prefix(&base).ok()?;
    let segments = relative
        .components()
        .map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

fn append_dir_entries<W: Write>(builder: &mut Builder<W>, dir: &Path, prefix: &str, matcher: &IgnoreMatcher) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("can not read {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };
        let file_type = entry.file_type()?;
        let ignored = matcher.is_ignored(&relative);
        if file_type.is_dir() {
            // exceptions may re-include something below an ignored directory
            if ignored && !matcher.has_exclusions() {
                continue;
            }
            if !ignored {
                append_dir(builder, &entry.path(), &relative)?;
            }
            append_dir_entries(builder, &entry.path(), &relative, matcher)?;
        } else if !ignored {
            builder
                .append_path_with_name(entry.path(), &relative)
                .with_context(|| format!("can not add {} to the build context", relative))?;
        }
    }
    Ok(())
}

fn append_dir<W: Write>(builder: &mut Builder<W>, path: &Path, relative: &str) -> Result<()> {
    let metadata = fs::metadata(path)?;
    let mut header = Header::new_gnu();
    header.set_metadata(&metadata);
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    builder
        .append_data(&mut header, format!("{}/", relative), std::io::empty())
        .map_err(|err| anyhow!("can not add {} to the build context: {}", relative, err))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Read;

    use flate2::read::GzDecoder;
    use tar::Archive;
    use tempfile::TempDir;

    use super::*;

    fn entries<R: Read>(reader: R) -> BTreeSet<String> {
        Archive::new(reader)
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect()
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        fs::write(dir.path().join("app.py"), "print(1)\n").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "a").unwrap();
        fs::write(dir.path().join("docs/keep.md"), "k").unwrap();
        dir
    }

    #[test]
    fn packs_everything_without_dockerignore() -> Result<()> {
        let dir = fixture();
        let archive = create_context(dir.path(), None, false)?;
        assert_eq!(archive.dockerfile, "Dockerfile");
        assert!(archive.size > 0);
        let names = entries(File::open(archive.path())?);
        for expected in ["Dockerfile", "app.py", "node_modules", "node_modules/pkg/index.js", "docs/a.md"] {
            assert!(names.contains(expected), "{} missing from {:?}", expected, names);
        }
        Ok(())
    }

    #[test]
    fn dockerignore_is_honored() -> Result<()> {
        let dir = fixture();
        fs::write(dir.path().join(".dockerignore"), "node_modules\ndocs\n!docs/keep.md\nDockerfile\n.dockerignore\n")?;
        let archive = create_context(dir.path(), None, false)?;
        let names = entries(File::open(archive.path())?);
        assert!(names.contains("Dockerfile"));
        assert!(names.contains(".dockerignore"));
        assert!(names.contains("app.py"));
        assert!(names.contains("docs/keep.md"));
        assert!(!names.contains("docs/a.md"));
        assert!(!names.iter().any(|name| name.starts_with("node_modules")));
        Ok(())
    }

    #[test]
    fn custom_dockerfile_inside_context() -> Result<()> {
        let dir = fixture();
        fs::create_dir_all(dir.path().join("build"))?;
        fs::write(dir.path().join("build/Dockerfile.prod"), "FROM alpine\n")?;
        let archive = create_context(dir.path(), Some("build/Dockerfile.prod"), false)?;
        assert_eq!(archive.dockerfile, "build/Dockerfile.prod");
        Ok(())
    }

    #[test]
    fn external_dockerfile_is_added() -> Result<()> {
        let dir = fixture();
        let other = TempDir::new()?;
        let external = other.path().join("Dockerfile.external");
        fs::write(&external, "FROM busybox\n")?;
        let archive = create_context(dir.path(), external.to_str(), true)?;
        assert!(archive.dockerfile.starts_with(".dockerfile."));
        let names = entries(GzDecoder::new(File::open(archive.path())?));
        assert!(names.contains(&archive.dockerfile));
        Ok(())
    }

    #[test]
    fn missing_inputs_fail() {
        let dir = fixture();
        let err = create_context(&dir.path().join("nope"), None, false).err().unwrap();
        assert!(err.to_string().contains("not found or not a directory"));
        let err = create_context(dir.path(), Some("Missing"), false).err().unwrap();
        assert!(err.to_string().starts_with("Cannot locate specified Dockerfile"));
    }

    #[test]
    fn relative_path_inside_base() {
        let dir = fixture();
        assert_eq!(relative_to(&dir.path().join("docs/a.md"), dir.path()).as_deref(), Some("docs/a.md"));
        assert_eq!(relative_to(dir.path(), dir.path()), None);
    }
}
