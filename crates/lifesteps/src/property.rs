use crate::params;
use lifecore::audit::cluster;
use lifecore::{ClusterObject, ItemProperty, KernelError, Result};
use liferuntime::{ActivityLogic, LogicContext};

/// Sets the value of an existing item property
pub struct WriteProperty;

impl ActivityLogic for WriteProperty {
    fn step_type(&self) -> &str {
        "WriteProperty"
    }

    fn description(&self) -> String {
        "Write an item property: [name, value]".to_string()
    }

    fn run(&self, ctx: &LogicContext<'_>, payload: &str) -> Result<String> {
        let params = params::expect(self.step_type(), payload, 2)?;
        let (name, value) = (&params[0], &params[1]);

        let path = format!("{}/{}", cluster::PROPERTY, name);
        let current = match ctx.storage.get(ctx.item, &path, Some(ctx.txn)) {
            Ok(ClusterObject::Property(p)) => p,
            Ok(_) => return Err(KernelError::invalid(format!("{} is not a property", path))),
            Err(KernelError::ObjectNotFound(_)) => {
                return Err(KernelError::not_found(format!("Property '{}' of item {}", name, ctx.item)));
            }
            Err(e) => return Err(e),
        };

        if !current.mutable && &current.value != value {
            return Err(KernelError::ObjectCannotBeUpdated(format!(
                "Property '{}' of item {} is immutable",
                name, ctx.item
            )));
        }

        tracing::info!(item = %ctx.item, agent = %ctx.agent, "setting {} to '{}'", name, value);
        ctx.storage.put(
            ctx.item,
            &ClusterObject::Property(ItemProperty {
                name: name.clone(),
                value: value.clone(),
                mutable: current.mutable,
            }),
            ctx.txn,
        )?;
        Ok(payload.to_string())
    }
}
