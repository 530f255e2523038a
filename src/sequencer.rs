//! Fetch a widget's models one after the other into its render
//! context.

//! The sequence is a state machine, `Pending(i)` while about to fetch
//! model `i`, then `Terminal`. The state travels with the
//! continuation of the single request in flight, which is why there
//! is never more than one, and why the context has exactly one owner
//! at any time.

use std::rc::Rc;

use crate::{api::ApiClient,
            context::RenderContext,
            fixtures::ModelRequest,
            info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Pending(usize),
    Terminal,
}

pub type OnComplete = Box<dyn FnOnce(RenderContext)>;

pub struct ModelFetchSequencer {
    api: Rc<ApiClient>,
    models: Rc<[ModelRequest]>,
    /// Used for models without `data_path`.
    default_data_path: Rc<str>,
    context: RenderContext,
    index: usize,
    on_complete: OnComplete,
}

impl ModelFetchSequencer {
    pub fn new(
        api: Rc<ApiClient>,
        models: Rc<[ModelRequest]>,
        default_data_path: Rc<str>,
        context: RenderContext,
        on_complete: OnComplete,
    ) -> Self {
        ModelFetchSequencer {
            api, models, default_data_path, context, index: 0, on_complete
        }
    }

    pub fn state(&self) -> SequencerState {
        if self.index < self.models.len() {
            SequencerState::Pending(self.index)
        } else {
            SequencerState::Terminal
        }
    }

    /// Go on from the current state: issue the fetch for the pending
    /// model, or hand the context to `on_complete` when there's
    /// nothing left to fetch.
    pub fn step(mut self) {
        match self.state() {
            SequencerState::Terminal => {
                let ModelFetchSequencer { context, on_complete, .. } = self;
                on_complete(context)
            }
            SequencerState::Pending(i) => {
                let model = &self.models[i];
                let path = model.data_path.as_deref()
                    .unwrap_or(&self.default_data_path)
                    .to_string();
                let (url, params) = (model.url.clone(), model.params());
                info!("fetching model {} ({}/{})",
                      model.model, i + 1, self.models.len());
                let api = self.api.clone();
                api.get(url.as_deref(), params, Some(&path), move |value| {
                    let key = self.models[i].scope_key().to_string();
                    self.context.insert(&key, value);
                    self.index = i + 1;
                    self.step()
                });
            }
        }
    }
}

/// Resolve `models` in order into `context`, then call
/// `on_complete` with it. Without models, `on_complete` runs right
/// away, without any request.
pub fn resolve_all(
    api: Rc<ApiClient>,
    models: Rc<[ModelRequest]>,
    default_data_path: Rc<str>,
    context: RenderContext,
    on_complete: OnComplete,
) {
    ModelFetchSequencer::new(api, models, default_data_path, context, on_complete).step()
}
