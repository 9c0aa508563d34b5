//! Mapping from asset references to files on disk.
//!
//! Two storage layouts share one asset root:
//!
//! ```text
//! <root>/drums/<category>/<folder>/<stem>.mp3     drum group, always mp3
//! <root>/<group>/<group>/<category>/<filename>    every other group
//! ```
//!
//! Resolution is pure string work. Nothing here touches the filesystem, so
//! the same reference always resolves to the same path.

use std::path::{Path, PathBuf};

use thiserror::Error;
use waiveconf::WaiveConfig;

/// Extension every drum sample is stored under, whatever the caller asked for.
const DRUM_EXTENSION: &str = ".mp3";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unsafe path segment {segment:?} in {field}")]
    UnsafeSegment { field: &'static str, segment: String },
}

/// Identifier of a media file as it appears in request paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub group: String,
    pub category: String,
    pub folder: String,
    pub filename: String,
}

impl AssetRef {
    pub fn new(
        group: impl Into<String>,
        category: impl Into<String>,
        folder: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            category: category.into(),
            folder: folder.into(),
            filename: filename.into(),
        }
    }
}

/// Where an asset lives: a directory and a bare filename inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub dir: PathBuf,
    pub filename: String,
}

impl ResolvedPath {
    pub fn full_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }
}

/// Resolves asset references against a fixed root.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
    drum_group: String,
    sound_group: String,
}

impl AssetResolver {
    pub fn new(
        root: impl Into<PathBuf>,
        drum_group: impl Into<String>,
        sound_group: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            drum_group: drum_group.into(),
            sound_group: sound_group.into(),
        }
    }

    pub fn from_config(config: &WaiveConfig) -> Self {
        Self::new(
            config.paths.assets_root.clone(),
            config.assets.drum_group.clone(),
            config.assets.sound_group.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn drum_group(&self) -> &str {
        &self.drum_group
    }

    pub fn resolve(&self, asset: &AssetRef) -> Result<ResolvedPath, ResolveError> {
        check_segment("group", &asset.group)?;
        check_segment("category", &asset.category)?;
        check_segment("filename", &asset.filename)?;

        if asset.group == self.drum_group {
            // Only drum paths include the folder
            check_segment("folder", &asset.folder)?;
            Ok(ResolvedPath {
                dir: self
                    .root
                    .join(&asset.group)
                    .join(&asset.category)
                    .join(&asset.folder),
                filename: normalize_drum_filename(&asset.filename),
            })
        } else {
            Ok(ResolvedPath {
                dir: self.category_dir(&asset.group, &asset.category)?,
                filename: asset.filename.clone(),
            })
        }
    }

    /// `/drum/...` predates the group segment; it always means the drum group.
    pub fn resolve_legacy_drum(
        &self,
        category: &str,
        folder: &str,
        filename: &str,
    ) -> Result<ResolvedPath, ResolveError> {
        self.resolve(&AssetRef::new(
            self.drum_group.clone(),
            category,
            folder,
            filename,
        ))
    }

    /// `/sound/...` files sit one level below the sound group, keyed by
    /// category and folder, and keep their requested name.
    pub fn resolve_legacy_sound(
        &self,
        category: &str,
        folder: &str,
        filename: &str,
    ) -> Result<ResolvedPath, ResolveError> {
        check_segment("category", category)?;
        check_segment("folder", folder)?;
        check_segment("filename", filename)?;

        Ok(ResolvedPath {
            dir: self
                .root
                .join(&self.sound_group)
                .join(category)
                .join(folder),
            filename: filename.to_string(),
        })
    }

    /// Directory holding a non-drum group's category. The group name is
    /// repeated on disk.
    pub fn category_dir(&self, group: &str, category: &str) -> Result<PathBuf, ResolveError> {
        check_segment("group", group)?;
        check_segment("category", category)?;
        Ok(self.root.join(group).join(group).join(category))
    }

    /// Directory whose subtree holds every file of `group`/`category`. For the
    /// drum group that is one level above the folders.
    pub fn listing_dir(&self, group: &str, category: &str) -> Result<PathBuf, ResolveError> {
        if group == self.drum_group {
            check_segment("category", category)?;
            Ok(self.root.join(group).join(category))
        } else {
            self.category_dir(group, category)
        }
    }
}

/// Drop everything from the first `.` and force the drum extension.
///
/// `kick.v2.wav` becomes `kick.mp3`; a name without a dot just gains `.mp3`.
pub fn normalize_drum_filename(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or(filename);
    format!("{}{}", stem, DRUM_EXTENSION)
}

/// MIME type from a file extension. Unknown extensions are served as bytes.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("mid") | Some("midi") => "audio/midi",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn check_segment(field: &'static str, segment: &str) -> Result<(), ResolveError> {
    let unsafe_segment = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\');

    if unsafe_segment {
        return Err(ResolveError::UnsafeSegment {
            field,
            segment: segment.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolver() -> AssetResolver {
        AssetResolver::new("/srv/assets", "drums", "synth")
    }

    #[test]
    fn drum_filename_is_normalized_to_mp3() {
        let resolved = resolver()
            .resolve(&AssetRef::new("drums", "kick", "808", "snare.v3.wav"))
            .unwrap();

        assert_eq!(resolved.dir, PathBuf::from("/srv/assets/drums/kick/808"));
        assert_eq!(resolved.filename, "snare.mp3");
        assert_eq!(
            resolved.full_path(),
            PathBuf::from("/srv/assets/drums/kick/808/snare.mp3")
        );
    }

    #[test]
    fn normalize_handles_odd_names() {
        assert_eq!(normalize_drum_filename("kick.v2.wav"), "kick.mp3");
        assert_eq!(normalize_drum_filename("kick"), "kick.mp3");
        assert_eq!(normalize_drum_filename("kick.mp3"), "kick.mp3");
        assert_eq!(normalize_drum_filename(".hidden"), ".mp3");
    }

    #[test]
    fn other_groups_pass_filename_through() {
        let resolved = resolver()
            .resolve(&AssetRef::new("synth", "lead", "anything", "patch01.wav"))
            .unwrap();

        assert_eq!(resolved.dir, PathBuf::from("/srv/assets/synth/synth/lead"));
        assert_eq!(resolved.filename, "patch01.wav");
    }

    #[test]
    fn folder_is_ignored_outside_drum_group() {
        let r = resolver();
        let a = r
            .resolve(&AssetRef::new("bass", "sub", "one", "b.wav"))
            .unwrap();
        let b = r
            .resolve(&AssetRef::new("bass", "sub", "two", "b.wav"))
            .unwrap();
        assert_eq!(a, b);

        // An unused folder is never validated
        let c = r
            .resolve(&AssetRef::new("bass", "sub", "..", "b.wav"))
            .unwrap();
        assert_eq!(a, c);
        let d = r
            .resolve(&AssetRef::new("synth", "lead", "", "patch01.wav"))
            .unwrap();
        assert_eq!(d.dir, PathBuf::from("/srv/assets/synth/synth/lead"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let r = resolver();
        let asset = AssetRef::new("drums", "hat", "open", "h.ogg");
        assert_eq!(r.resolve(&asset).unwrap(), r.resolve(&asset).unwrap());
    }

    #[test]
    fn traversal_segments_are_rejected() {
        let r = resolver();
        for asset in [
            AssetRef::new("..", "kick", "808", "a.wav"),
            AssetRef::new("drums", ".", "808", "a.wav"),
            AssetRef::new("drums", "kick", "", "a.wav"),
            AssetRef::new("synth", "lead", "x", "../../etc/passwd"),
            AssetRef::new("synth", "le\\ad", "x", "a.wav"),
        ] {
            assert!(
                matches!(r.resolve(&asset), Err(ResolveError::UnsafeSegment { .. })),
                "{:?} should be rejected",
                asset
            );
        }
    }

    #[test]
    fn legacy_drum_matches_drum_group() {
        let r = resolver();
        assert_eq!(
            r.resolve_legacy_drum("kick", "808", "k.wav").unwrap(),
            r.resolve(&AssetRef::new("drums", "kick", "808", "k.wav"))
                .unwrap()
        );
    }

    #[test]
    fn legacy_sound_uses_sound_group_and_folder() {
        let resolved = resolver()
            .resolve_legacy_sound("pads", "warm", "pad.wav")
            .unwrap();
        assert_eq!(resolved.dir, PathBuf::from("/srv/assets/synth/pads/warm"));
        assert_eq!(resolved.filename, "pad.wav");
    }

    #[test]
    fn custom_drum_group_switches_rules() {
        let r = AssetResolver::new("/a", "perc", "synth");
        let resolved = r
            .resolve(&AssetRef::new("perc", "conga", "low", "hit.wav"))
            .unwrap();
        assert_eq!(resolved.filename, "hit.mp3");

        let resolved = r
            .resolve(&AssetRef::new("drums", "kick", "808", "k.wav"))
            .unwrap();
        assert_eq!(resolved.dir, PathBuf::from("/a/drums/drums/kick"));
        assert_eq!(resolved.filename, "k.wav");
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for(Path::new("a/b.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a/b.WAV")), "audio/wav");
        assert_eq!(content_type_for(Path::new("a/b.mid")), "audio/midi");
        assert_eq!(content_type_for(Path::new("a/b")), "application/octet-stream");
    }
}
