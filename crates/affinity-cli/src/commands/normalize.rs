use affinity_core::{NameNormalizer, ReplicaSuffixNormalizer};

pub fn normalize(names: &[String]) -> anyhow::Result<()> {
    for name in names {
        println!("{name}\t{}", ReplicaSuffixNormalizer.normalize(name));
    }
    Ok(())
}
