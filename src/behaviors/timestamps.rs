use crate::model::pipeline::BEFORE_SAVE;
use crate::model::{handler_fn, ModelDraft};
use crate::value::Value;

pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";

/// `before save`: stamp `modified`, and `created` on new records, unless supplied.
pub fn register_timestamps(draft: &mut ModelDraft) {
    draft.observe(
        BEFORE_SAVE,
        handler_fn(|_, ctx| {
            let now = Value::DateTime(chrono::Utc::now());
            let is_new = ctx.is_new_instance;
            let data = ctx.data.get_or_insert_with(Default::default);
            data.entry(MODIFIED.to_string()).or_insert_with(|| now.clone());
            if is_new {
                data.entry(CREATED.to_string()).or_insert(now);
            }
            Ok(())
        }),
    );
}
