//! Session state
//!
//! A [`Session`] exclusively owns the engine handle together with the
//! workspace root, the active project and the configuration. There is no
//! process-wide engine: callers create a session and pass it where needed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine::{launch_engine, Engine, EngineKind};
use crate::error::{HarnessError, Result};
use crate::project::{CurrentProject, Project, ProjectListing, ProjectManager};
use crate::validation::WarningClassifier;

pub struct Session {
    engine: Option<Box<dyn Engine>>,
    version: Option<String>,
    config: SessionConfig,
    workspace_dir: PathBuf,
    project: Option<Project>,
    classifier: WarningClassifier,
}

impl Session {
    /// Create a stopped session, creating the workspace directory
    pub fn new(config: SessionConfig) -> Result<Self> {
        let workspace_dir = config.workspace_dir.clone();
        fs::create_dir_all(&workspace_dir)?;

        Ok(Self {
            engine: None,
            version: None,
            config,
            workspace_dir,
            project: None,
            classifier: WarningClassifier::default(),
        })
    }

    /// Replace the warning classification tables
    pub fn with_classifier(mut self, classifier: WarningClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Launch an engine. Returns the engine version.
    ///
    /// Already running: returns the running engine's version without launching.
    pub async fn start(&mut self, kind: EngineKind) -> Result<String> {
        if let Some(version) = self.running_version() {
            debug!("engine already running");
            return Ok(version);
        }

        let engine = launch_engine(kind, &self.config).await?;
        self.install(engine).await
    }

    /// Install an already-launched engine
    pub async fn attach(&mut self, engine: Box<dyn Engine>) -> Result<String> {
        if self.is_running() {
            return Err(HarnessError::EngineAlreadyRunning);
        }
        self.install(engine).await
    }

    async fn install(&mut self, mut engine: Box<dyn Engine>) -> Result<String> {
        let version = match engine.version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "could not read engine version");
                "unknown".to_string()
            }
        };
        info!(engine = engine.name(), %version, "engine started");
        self.engine = Some(engine);
        self.version = Some(version.clone());
        Ok(version)
    }

    /// Shut the engine down. Returns whether one was running.
    ///
    /// The handle is released even when the engine fails to quit cleanly.
    pub async fn stop(&mut self) -> bool {
        let Some(mut engine) = self.engine.take() else {
            return false;
        };
        self.version = None;
        if let Err(e) = engine.quit().await {
            warn!(error = %e, "engine did not quit cleanly");
        }
        info!(engine = engine.name(), "engine stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    fn running_version(&self) -> Option<String> {
        self.engine.as_ref().and(self.version.clone())
    }

    /// The live engine, if any
    pub fn engine_mut(&mut self) -> Option<&mut dyn Engine> {
        match self.engine.as_mut() {
            Some(engine) => Some(engine.as_mut()),
            None => None,
        }
    }

    /// The live engine, or `EngineNotRunning`
    pub fn require_engine(&mut self) -> Result<&mut dyn Engine> {
        match self.engine.as_mut() {
            Some(engine) => Ok(engine.as_mut()),
            None => Err(HarnessError::EngineNotRunning),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn classifier(&self) -> &WarningClassifier {
        &self.classifier
    }

    /// Current workspace root (the project directory once a project is set)
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    fn project_manager(&self) -> ProjectManager {
        ProjectManager::new(self.config.projects_root())
    }

    /// Select a project, creating its directory, and make it the workspace root
    pub fn set_project(&mut self, name: &str) -> Result<Project> {
        let project = self.project_manager().ensure(name)?;
        info!(project = %project.name, dir = %project.dir.display(), "project selected");
        self.workspace_dir = project.dir.clone();
        self.project = Some(project.clone());
        Ok(project)
    }

    pub fn current_project(&self) -> CurrentProject {
        match &self.project {
            Some(project) => CurrentProject::Active {
                name: project.name.clone(),
                dir: project.dir.clone(),
                workspace_dir: self.workspace_dir.clone(),
            },
            None => CurrentProject::NoneSet {
                workspace_dir: self.workspace_dir.clone(),
            },
        }
    }

    pub fn list_projects(&self) -> Result<ProjectListing> {
        let manager = self.project_manager();
        Ok(ProjectListing {
            projects: manager.list()?,
            root: manager.root().to_path_buf(),
            current: self.project.as_ref().map(|p| p.name.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> SessionConfig {
        SessionConfig {
            workspace_dir: dir.path().join("ws"),
            projects_root: Some(dir.path().join("MATLAB_Projects")),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_new_creates_workspace() {
        let dir = TempDir::new().unwrap();
        let session = Session::new(config(&dir)).unwrap();
        assert!(session.workspace_dir().is_dir());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_lifecycle_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::new(config(&dir)).unwrap();

        let version = session.start(EngineKind::Mock).await.unwrap();
        assert!(session.is_running());
        assert_eq!(session.start(EngineKind::Mock).await.unwrap(), version);

        assert!(session.stop().await);
        assert!(!session.stop().await);
        assert!(!session.is_running());
        assert!(matches!(
            session.require_engine(),
            Err(HarnessError::EngineNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_attach_refuses_second_engine() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::new(config(&dir)).unwrap();
        session.attach(Box::new(MockEngine::new())).await.unwrap();

        let err = session.attach(Box::new(MockEngine::new())).await.unwrap_err();
        assert_eq!(err.code(), "MLH-011");
    }

    #[tokio::test]
    async fn test_stop_calls_quit() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::new();
        let mut session = Session::new(config(&dir)).unwrap();
        session.attach(Box::new(engine.clone())).await.unwrap();

        session.stop().await;
        assert_eq!(engine.calls().last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn test_projects_redirect_workspace() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::new(config(&dir)).unwrap();

        assert!(matches!(session.current_project(), CurrentProject::NoneSet { .. }));
        assert!(session.list_projects().unwrap().projects.is_empty());

        let project = session.set_project("Foo").unwrap();
        assert_eq!(session.workspace_dir(), project.dir.as_path());

        let listing = session.list_projects().unwrap();
        assert_eq!(listing.projects, vec!["Foo"]);
        assert_eq!(listing.current.as_deref(), Some("Foo"));

        match session.current_project() {
            CurrentProject::Active { name, dir, .. } => {
                assert_eq!(name, "Foo");
                assert!(dir.ends_with("MATLAB_Projects/Foo"));
            }
            other => panic!("expected active project, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_project_switch_keeps_state() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::new(config(&dir)).unwrap();
        let before = session.workspace_dir().to_path_buf();

        assert!(session.set_project("..").is_err());
        assert_eq!(session.workspace_dir(), before.as_path());
        assert!(session.project().is_none());
    }
}
