/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decide (`handle`) then evolve (`apply`) each resulting event, mutating the
/// aggregate in place. For the full pipeline with persistence and publication
/// use the infra dispatcher; this is the inline/test path.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: kitforge_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
