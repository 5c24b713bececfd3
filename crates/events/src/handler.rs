/// Execute an aggregate command in memory: decide, then apply.
///
/// No persistence and no publication. Used by tests and by workflows that need
/// to chain several commands on the same loaded aggregate before committing
/// (e.g. two delivery lines drawing on the same product's stock ledger).
///
/// If `handle` fails the aggregate is left untouched.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: gescom_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
