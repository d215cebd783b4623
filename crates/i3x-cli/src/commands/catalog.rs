//! Catalog commands - namespaces, types, relationships and objects

use anyhow::{Context, Result};
use i3x_client::I3xClient;

use crate::output::{NamespaceRow, ObjectRow, ObjectTypeRow, OutputContext, RelationshipRow};

/// List all namespaces
pub async fn namespaces(client: &I3xClient, ctx: &OutputContext) -> Result<()> {
    let namespaces = client
        .get_namespaces()
        .await
        .context("Failed to list namespaces")?;

    let rows: Vec<NamespaceRow> = namespaces
        .into_iter()
        .map(|ns| NamespaceRow {
            uri: ns.uri,
            name: ns.display_name,
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

/// List object types
pub async fn types(client: &I3xClient, namespace: Option<&str>, ctx: &OutputContext) -> Result<()> {
    let types = client
        .get_object_types(namespace)
        .await
        .context("Failed to list object types")?;

    let rows: Vec<ObjectTypeRow> = types
        .into_iter()
        .map(|t| ObjectTypeRow {
            id: t.element_id,
            name: t.display_name,
            namespace: t.namespace_uri,
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

/// List relationship types
pub async fn relationships(
    client: &I3xClient,
    namespace: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let types = client
        .get_relationship_types(namespace)
        .await
        .context("Failed to list relationship types")?;

    let rows: Vec<RelationshipRow> = types
        .into_iter()
        .map(|t| RelationshipRow {
            id: t.element_id,
            name: t.display_name,
            namespace: t.namespace_uri,
            reverse_of: t.reverse_of,
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

/// List object instances
pub async fn objects(client: &I3xClient, type_id: Option<&str>, ctx: &OutputContext) -> Result<()> {
    let objects = client
        .get_objects(type_id, false)
        .await
        .context("Failed to list objects")?;

    let rows: Vec<ObjectRow> = objects
        .into_iter()
        .map(|o| ObjectRow {
            id: o.element_id,
            name: o.display_name,
            type_id: o.type_id,
            parent: o.parent_id.unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
