use indexmap::IndexMap;
use itertools::Itertools;

use crate::yaml::Config;

/// One expanded matrix combination: variable name -> bound value, in
/// declaration order.
pub type Axis = IndexMap<String, String>;

/// Expand a config's `matrix`/`include`/`exclude` block into the ordered
/// list of axis combinations each job runs with.
///
/// Variables vary in declaration order with the first-declared variable
/// slowest-varying, matching a plain nested-loop expansion: for each value
/// of the first variable, iterate every value of the second, and so on.
/// A config with no `matrix` block expands to a single empty axis.
pub fn expand(config: &Config) -> Vec<Axis> {
    let mut combos: Vec<Axis> = if config.matrix.is_empty() {
        vec![Axis::new()]
    } else {
        let names: Vec<&String> = config.matrix.keys().collect();
        config
            .matrix
            .values()
            .map(|values| values.iter())
            .multi_cartesian_product()
            .map(|combo| {
                names
                    .iter()
                    .zip(combo)
                    .map(|(name, value)| ((*name).clone(), value.clone()))
                    .collect::<Axis>()
            })
            .collect()
    };

    for exclude in &config.exclude {
        combos.retain(|axis| !matches_entry(axis, exclude));
    }

    for include in &config.include {
        let mut axis = Axis::new();
        for (k, v) in include {
            axis.insert(k.clone(), v.clone());
        }
        combos.push(axis);
    }

    combos
}

fn matches_entry(axis: &Axis, entry: &IndexMap<String, String>) -> bool {
    entry.iter().all(|(k, v)| axis.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::Step;

    fn base_config() -> Config {
        Config {
            clone: None,
            setup: None,
            services: vec![],
            build: Step {
                image: "golang".into(),
                when: None,
                settings: IndexMap::new(),
            },
            publish: vec![],
            deploy: vec![],
            notify: vec![],
            matrix: IndexMap::new(),
            include: vec![],
            exclude: vec![],
            branches: vec![],
            cache: Default::default(),
        }
    }

    #[test]
    fn no_matrix_yields_single_empty_axis() {
        let config = base_config();
        let axes = expand(&config);
        assert_eq!(axes.len(), 1);
        assert!(axes[0].is_empty());
    }

    #[test]
    fn two_axes_expand_in_declared_order() {
        let mut config = base_config();
        config
            .matrix
            .insert("GO".into(), vec!["1.20".into(), "1.21".into()]);
        config
            .matrix
            .insert("DB".into(), vec!["pg".into(), "mysql".into()]);

        let axes = expand(&config);
        let rendered: Vec<(String, String)> = axes
            .iter()
            .map(|axis| (axis["GO"].clone(), axis["DB"].clone()))
            .collect();

        assert_eq!(
            rendered,
            vec![
                ("1.20".into(), "pg".into()),
                ("1.20".into(), "mysql".into()),
                ("1.21".into(), "pg".into()),
                ("1.21".into(), "mysql".into()),
            ]
        );
    }

    #[test]
    fn exclude_removes_matching_combination() {
        let mut config = base_config();
        config
            .matrix
            .insert("GO".into(), vec!["1.20".into(), "1.21".into()]);
        config
            .matrix
            .insert("DB".into(), vec!["pg".into(), "mysql".into()]);
        let mut exclude = IndexMap::new();
        exclude.insert("GO".into(), "1.20".into());
        exclude.insert("DB".into(), "mysql".into());
        config.exclude.push(exclude);

        let axes = expand(&config);
        assert_eq!(axes.len(), 3);
        assert!(!axes
            .iter()
            .any(|axis| axis["GO"] == "1.20" && axis["DB"] == "mysql"));
    }

    #[test]
    fn include_appends_pinned_combination() {
        let mut config = base_config();
        config.matrix.insert("GO".into(), vec!["1.20".into()]);
        let mut include = IndexMap::new();
        include.insert("GO".into(), "1.19".into());
        include.insert("LEGACY".into(), "true".into());
        config.include.push(include);

        let axes = expand(&config);
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[1]["GO"], "1.19");
        assert_eq!(axes[1]["LEGACY"], "true");
    }
}
