use std::collections::HashSet;

use crate::app::artifact_store::{ArtifactCount, count_artifacts};
use crate::app::model::{Manuscript, ManuscriptState};
use crate::app::sentinel::SENTINEL_IDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing stored yet.
    Generate,
    AlwaysUpdate,
    Interrupted,
    MissingArtifacts(ArtifactCount),
    Changed,
    ChangedButRefreshDisabled,
    Unchanged,
}

impl Decision {
    pub fn regenerates(self) -> bool {
        matches!(
            self,
            Self::Generate
                | Self::AlwaysUpdate
                | Self::Interrupted
                | Self::MissingArtifacts(_)
                | Self::Changed
        )
    }
}

/// Decides whether a freshly built manuscript must be synthesized again.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    refresh: bool,
    always_update: HashSet<String>,
    always_refresh: HashSet<String>,
}

impl FreshnessPolicy {
    pub fn new(refresh: bool, always_update: impl IntoIterator<Item = String>) -> Self {
        Self {
            refresh,
            always_update: always_update.into_iter().collect(),
            always_refresh: SENTINEL_IDS.iter().map(|id| (*id).to_owned()).collect(),
        }
    }

    pub fn check(&self, fresh: &Manuscript, persisted: Option<&Manuscript>) -> Decision {
        let Some(persisted) = persisted else {
            return Decision::Generate;
        };
        if self.always_update.contains(&fresh.id) {
            return Decision::AlwaysUpdate;
        }
        if persisted.state == ManuscriptState::Generating {
            return Decision::Interrupted;
        }
        let artifacts = count_artifacts(fresh);
        if !artifacts.is_complete() {
            return Decision::MissingArtifacts(artifacts);
        }
        if fresh.content_differs(persisted) {
            if self.refresh || self.always_refresh.contains(&fresh.id) {
                return Decision::Changed;
            }
            return Decision::ChangedButRefreshDisabled;
        }
        Decision::Unchanged
    }
}

pub fn log_decision(manuscript: &Manuscript, decision: Decision) {
    let id = manuscript.id.as_str();
    let title = manuscript.title.as_str();
    match decision {
        Decision::Generate => tracing::info!(id, title, "article not yet generated; generating"),
        Decision::AlwaysUpdate => tracing::warn!(id, title, "article is always updated; regenerating"),
        Decision::Interrupted => {
            tracing::warn!(id, title, "article interrupted during generation; regenerating")
        }
        Decision::MissingArtifacts(count) => tracing::warn!(
            id,
            title,
            present = count.present,
            required = count.required,
            "article has fewer generated files than needed; regenerating"
        ),
        Decision::Changed => tracing::info!(id, title, "article changed; regenerating"),
        Decision::ChangedButRefreshDisabled => tracing::warn!(
            id,
            title,
            "article changed, but refreshing is disabled; skipping"
        ),
        Decision::Unchanged => tracing::info!(id, title, "article unchanged; skipping"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::app::artifact_store::ArtifactLayout;
    use crate::app::model::{Section, SectionType, TextSpan};
    use crate::app::sentinel::ERROR_ID;

    fn manuscript(layout: &ArtifactLayout, id: &str, words: &str) -> Manuscript {
        let mut section = Section::new(
            SectionType::P,
            vec![TextSpan {
                text: words.to_owned(),
            }],
        );
        layout.assign_section(id, 0, &mut section);
        let mut manuscript = Manuscript::new(id, id, ManuscriptState::Generating);
        manuscript.sections = vec![section];
        manuscript.outro = Some(layout.outro(id));
        manuscript
    }

    fn write_artifacts(layout: &ArtifactLayout, id: &str) -> anyhow::Result<()> {
        let dir = layout.audio_dir(id);
        std::fs::create_dir_all(&dir)?;
        for name in ["0000.wav", "0000.json", "outro.wav"] {
            std::fs::write(dir.join(name), b"")?;
        }
        Ok(())
    }

    fn done(mut manuscript: Manuscript) -> Manuscript {
        manuscript.state = ManuscriptState::Done;
        manuscript
    }

    #[test]
    fn unseen_articles_are_generated() {
        let layout = ArtifactLayout::new(Path::new("/nonexistent"), "/db");
        let fresh = manuscript(&layout, "a", "hi");
        assert_eq!(FreshnessPolicy::new(false, []).check(&fresh, None), Decision::Generate);
    }

    #[test]
    fn always_update_wins_over_identical_complete_articles() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = ArtifactLayout::new(dir.path(), "/db");
        write_artifacts(&layout, "a")?;
        let fresh = manuscript(&layout, "a", "hi");
        let persisted = done(fresh.clone());

        let policy = FreshnessPolicy::new(false, ["a".to_owned()]);
        assert_eq!(policy.check(&fresh, Some(&persisted)), Decision::AlwaysUpdate);
        assert_eq!(
            FreshnessPolicy::new(false, []).check(&fresh, Some(&persisted)),
            Decision::Unchanged
        );
        Ok(())
    }

    #[test]
    fn interrupted_and_incomplete_articles_regenerate() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = ArtifactLayout::new(dir.path(), "/db");
        let policy = FreshnessPolicy::new(false, []);
        let fresh = manuscript(&layout, "a", "hi");

        assert_eq!(policy.check(&fresh, Some(&fresh)), Decision::Interrupted);
        let decision = policy.check(&fresh, Some(&done(fresh.clone())));
        assert!(matches!(decision, Decision::MissingArtifacts(count) if count.present == 0));
        assert!(decision.regenerates());
        Ok(())
    }

    #[test]
    fn changes_only_regenerate_when_refresh_applies() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = ArtifactLayout::new(dir.path(), "/db");
        write_artifacts(&layout, "a")?;
        write_artifacts(&layout, ERROR_ID)?;

        let persisted = done(manuscript(&layout, "a", "old"));
        let fresh = manuscript(&layout, "a", "new");
        assert_eq!(
            FreshnessPolicy::new(false, []).check(&fresh, Some(&persisted)),
            Decision::ChangedButRefreshDisabled
        );
        assert_eq!(
            FreshnessPolicy::new(true, []).check(&fresh, Some(&persisted)),
            Decision::Changed
        );

        let persisted = done(manuscript(&layout, ERROR_ID, "old"));
        let fresh = manuscript(&layout, ERROR_ID, "new");
        assert_eq!(
            FreshnessPolicy::new(false, []).check(&fresh, Some(&persisted)),
            Decision::Changed
        );
        Ok(())
    }
}
