use crate::model::{
    AnalysisJob, Assembly, DownloadFile, DownloadParent, Run, Sample, Study, SuppressionState,
};
use crate::store::{Catalog, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Authenticated(Principal),
}

impl Caller {
    pub fn user(username: &str) -> Self {
        Caller::Authenticated(Principal {
            username: username.to_string(),
            is_superuser: false,
        })
    }

    pub fn superuser(username: &str) -> Self {
        Caller::Authenticated(Principal {
            username: username.to_string(),
            is_superuser: true,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisibilityFilter<'a> {
    caller: &'a Caller,
    include_suppressed: bool,
}

impl<'a> VisibilityFilter<'a> {
    pub fn new(caller: &'a Caller) -> Self {
        Self {
            caller,
            include_suppressed: false,
        }
    }

    pub fn audit(mut self) -> Self {
        self.include_suppressed = matches!(
            self.caller,
            Caller::Authenticated(Principal {
                is_superuser: true,
                ..
            })
        );
        self
    }

    pub fn admits(&self, state: &SuppressionState, owner: Option<&str>) -> bool {
        match self.caller {
            Caller::Authenticated(principal) if principal.is_superuser => {
                self.include_suppressed || !state.is_suppressed
            }
            _ if state.is_suppressed => false,
            Caller::Anonymous => !state.is_private,
            Caller::Authenticated(principal) => {
                !state.is_private || owner == Some(principal.username.as_str())
            }
        }
    }
}

pub trait Visible {
    fn is_visible(&self, catalog: &Catalog, filter: &VisibilityFilter<'_>) -> bool;
}

fn study_owner(catalog: &Catalog, study: Option<u64>) -> Option<&str> {
    study
        .and_then(|id| catalog.studies.get(&id))
        .and_then(|study| study.submission_account.as_deref())
}

impl Visible for Study {
    fn is_visible(&self, _catalog: &Catalog, filter: &VisibilityFilter<'_>) -> bool {
        filter.admits(&self.state, self.submission_account.as_deref())
    }
}

impl Visible for Sample {
    fn is_visible(&self, catalog: &Catalog, filter: &VisibilityFilter<'_>) -> bool {
        if filter.admits(&self.state, self.submission_account.as_deref()) {
            return true;
        }
        self.studies
            .iter()
            .any(|id| filter.admits(&self.state, study_owner(catalog, Some(*id))))
    }
}

impl Visible for Run {
    fn is_visible(&self, catalog: &Catalog, filter: &VisibilityFilter<'_>) -> bool {
        filter.admits(&self.state, study_owner(catalog, self.study))
    }
}

impl Visible for Assembly {
    fn is_visible(&self, catalog: &Catalog, filter: &VisibilityFilter<'_>) -> bool {
        filter.admits(&self.state, study_owner(catalog, self.study))
    }
}

impl Visible for AnalysisJob {
    fn is_visible(&self, catalog: &Catalog, filter: &VisibilityFilter<'_>) -> bool {
        filter.admits(&self.state, study_owner(catalog, Some(self.study)))
    }
}

impl Visible for DownloadFile {
    fn is_visible(&self, catalog: &Catalog, filter: &VisibilityFilter<'_>) -> bool {
        match self.parent {
            DownloadParent::Study(id) => catalog
                .studies
                .get(&id)
                .is_some_and(|parent| parent.is_visible(catalog, filter)),
            DownloadParent::Sample(id) => catalog
                .samples
                .get(&id)
                .is_some_and(|parent| parent.is_visible(catalog, filter)),
            DownloadParent::Run(id) => catalog
                .runs
                .get(&id)
                .is_some_and(|parent| parent.is_visible(catalog, filter)),
            DownloadParent::Analysis(id) => catalog
                .analyses
                .get(&id)
                .is_some_and(|parent| parent.is_visible(catalog, filter)),
        }
    }
}

impl Catalog {
    pub fn available<'a, E>(
        &'a self,
        filter: VisibilityFilter<'a>,
    ) -> impl Iterator<Item = &'a E> + 'a
    where
        E: Table + Visible + 'a,
    {
        E::table(self)
            .values()
            .filter(move |record| record.is_visible(self, &filter))
    }

    pub fn available_downloads<'a>(
        &'a self,
        filter: VisibilityFilter<'a>,
    ) -> impl Iterator<Item = &'a DownloadFile> + 'a {
        self.downloads
            .values()
            .filter(move |download| download.is_visible(self, &filter))
    }
}
