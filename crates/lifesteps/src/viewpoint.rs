use crate::params;
use lifecore::audit::cluster;
use lifecore::{ClusterObject, KernelError, Result, Viewpoint};
use liferuntime::{ActivityLogic, History, LogicContext};

/// Points a named viewpoint at the outcome of an earlier event
pub struct WriteViewpoint;

impl ActivityLogic for WriteViewpoint {
    fn step_type(&self) -> &str {
        "WriteViewpoint"
    }

    fn description(&self) -> String {
        "Point a viewpoint at an event's outcome: [schema, view, eventId]".to_string()
    }

    fn run(&self, ctx: &LogicContext<'_>, payload: &str) -> Result<String> {
        let params = params::expect(self.step_type(), payload, 3)?;
        let (schema_name, view) = (&params[0], &params[1]);
        let event_id: u64 = params[2]
            .trim()
            .parse()
            .map_err(|_| KernelError::invalid(format!("Bad event id '{}'", params[2])))?;

        let event = History::new(ctx.storage, ctx.item, ctx.txn).event(event_id)?;
        let schema = event
            .schema
            .filter(|s| &s.name == schema_name)
            .ok_or_else(|| {
                KernelError::invalid(format!("Event {} has no outcome of schema '{}'", event_id, schema_name))
            })?;

        tracing::info!(item = %ctx.item, "viewpoint {}/{} now at event {}", schema.name, view, event_id);
        ctx.storage.put(
            ctx.item,
            &ClusterObject::Viewpoint(Viewpoint {
                item: ctx.item,
                schema,
                name: view.clone(),
                event_id,
            }),
            ctx.txn,
        )?;
        Ok(payload.to_string())
    }
}

/// Deletes a named viewpoint
pub struct RemoveViewpoint;

impl ActivityLogic for RemoveViewpoint {
    fn step_type(&self) -> &str {
        "RemoveViewpoint"
    }

    fn description(&self) -> String {
        "Remove a viewpoint: [schema, view]".to_string()
    }

    fn run(&self, ctx: &LogicContext<'_>, payload: &str) -> Result<String> {
        let params = params::expect(self.step_type(), payload, 2)?;
        let path = format!("{}/{}/{}", cluster::VIEWPOINT, params[0], params[1]);

        tracing::info!(item = %ctx.item, "removing {}", path);
        ctx.storage.remove(ctx.item, &path, ctx.txn)?;
        Ok(payload.to_string())
    }
}
