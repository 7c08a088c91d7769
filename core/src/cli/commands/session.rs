use super::print_json;
use crate::cli::Workspace;

pub async fn run(workspace: &Workspace, no_refs: bool) -> Result<(), String> {
    let session = workspace.build_session(!no_refs).await?;
    print_json(&session)
}
