//! Reader for Haar cascades in the XML layout written by OpenCV's cascade
//! trainer (`<opencv_storage><cascade>` with BOOST stages of stumps).

use std::str::FromStr;

use roxmltree::{Document, Node};

use crate::detection::infrastructure::haar_cascade::{
    CascadeError, CascadeModel, HaarFeature, Stage, WeakClassifier, WeightedRect,
};

pub fn parse_opencv_cascade(text: &str) -> Result<CascadeModel, CascadeError> {
    let doc = Document::parse(text)?;
    let cascade = child(doc.root_element(), "cascade").ok_or_else(|| {
        invalid("no <cascade> element (legacy haarcascade layouts are not supported)")
    })?;

    if let Some(kind) = child(cascade, "featureType") {
        let kind = kind.text().unwrap_or("").trim();
        if !kind.eq_ignore_ascii_case("HAAR") {
            return Err(invalid(format!("unsupported feature type '{kind}'")));
        }
    }

    let window_width = scalar(required(cascade, "width")?)?;
    let window_height = scalar(required(cascade, "height")?)?;
    let stages = items(required(cascade, "stages")?)
        .into_iter()
        .map(parse_stage)
        .collect::<Result<Vec<_>, _>>()?;
    let features = items(required(cascade, "features")?)
        .into_iter()
        .map(parse_feature)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CascadeModel {
        window_width,
        window_height,
        stages,
        features,
    })
}

fn parse_stage(node: Node) -> Result<Stage, CascadeError> {
    let threshold = scalar(required(node, "stageThreshold")?)?;
    let weak_classifiers = items(required(node, "weakClassifiers")?)
        .into_iter()
        .map(parse_weak_classifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        weak_classifiers,
    })
}

fn parse_weak_classifier(node: Node) -> Result<WeakClassifier, CascadeError> {
    let nodes = numbers(required(node, "internalNodes")?)?;
    let leaves = numbers(required(node, "leafValues")?)?;

    // One split node: left, right, feature index, threshold.
    let &[_, _, feature, threshold] = nodes.as_slice() else {
        return Err(invalid(format!(
            "weak classifier has {} internal node values; only stumps are supported",
            nodes.len()
        )));
    };
    let &[left, right] = leaves.as_slice() else {
        return Err(invalid(format!(
            "stump has {} leaf values, expected 2",
            leaves.len()
        )));
    };

    Ok(WeakClassifier {
        feature: index(feature)? as usize,
        threshold,
        left,
        right,
    })
}

fn parse_feature(node: Node) -> Result<HaarFeature, CascadeError> {
    let rects = items(required(node, "rects")?)
        .into_iter()
        .map(|rect| {
            let values = numbers(rect)?;
            let &[x, y, width, height, weight] = values.as_slice() else {
                return Err(invalid(format!(
                    "feature rect has {} values, expected x y width height weight",
                    values.len()
                )));
            };
            Ok(WeightedRect {
                x: index(x)?,
                y: index(y)?,
                width: index(width)?,
                height: index(height)?,
                weight,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let tilted = match child(node, "tilted") {
        Some(flag) => scalar::<u8>(flag)? != 0,
        None => false,
    };
    Ok(HaarFeature { rects, tilted })
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn required<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Result<Node<'a, 'i>, CascadeError> {
    child(node, name).ok_or_else(|| {
        invalid(format!(
            "<{}> has no <{name}> element",
            node.tag_name().name()
        ))
    })
}

/// Element children; list entries are all named `_`.
fn items<'a, 'i>(node: Node<'a, 'i>) -> Vec<Node<'a, 'i>> {
    node.children().filter(|n| n.is_element()).collect()
}

fn scalar<T: FromStr>(node: Node) -> Result<T, CascadeError> {
    let text = node.text().unwrap_or("").trim();
    text.parse().map_err(|_| {
        invalid(format!(
            "<{}> holds '{text}', expected a number",
            node.tag_name().name()
        ))
    })
}

fn numbers(node: Node) -> Result<Vec<f64>, CascadeError> {
    node.text()
        .unwrap_or("")
        .split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                invalid(format!(
                    "<{}> holds non-numeric value '{token}'",
                    node.tag_name().name()
                ))
            })
        })
        .collect()
}

fn index(value: f64) -> Result<u32, CascadeError> {
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(invalid(format!("expected a non-negative integer, got {value}")));
    }
    Ok(value as u32)
}

fn invalid(message: impl Into<String>) -> CascadeError {
    CascadeError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::haar_cascade::test_support::{
        bright_block_cascade, BRIGHT_BLOCK_XML,
    };

    #[test]
    fn test_parses_trainer_output() {
        let model = parse_opencv_cascade(BRIGHT_BLOCK_XML).unwrap();
        assert_eq!(model, bright_block_cascade());
    }

    #[test]
    fn test_reads_tilted_flag() {
        let xml = BRIGHT_BLOCK_XML.replace(
            "2 2 4 4 2.</_></rects>",
            "2 2 4 4 2.</_></rects>\n      <tilted>1</tilted>",
        );
        let model = parse_opencv_cascade(&xml).unwrap();
        assert!(model.features[0].tilted);
        assert!(matches!(model.validate(), Err(CascadeError::Invalid(_))));
    }

    #[test]
    fn test_rejects_multi_node_trees() {
        let xml = BRIGHT_BLOCK_XML.replace(
            "0 -1 0 5.0000000000000000e-01",
            "1 -1 0 0.5 0 -2 0 0.1",
        );
        let err = parse_opencv_cascade(&xml).unwrap_err();
        assert!(err.to_string().contains("only stumps"));
    }

    #[test]
    fn test_rejects_legacy_layout() {
        let xml = r#"<?xml version="1.0"?>
<opencv_storage>
<haarcascade_frontalface_alt type_id="opencv-haar-classifier">
  <size>20 20</size>
  <stages></stages>
</haarcascade_frontalface_alt>
</opencv_storage>"#;
        assert!(matches!(
            parse_opencv_cascade(xml),
            Err(CascadeError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_non_haar_features() {
        let xml = BRIGHT_BLOCK_XML.replace(">HAAR<", ">LBP<");
        let err = parse_opencv_cascade(&xml).unwrap_err();
        assert!(err.to_string().contains("LBP"));
    }

    #[test]
    fn test_rejects_missing_window() {
        let xml = BRIGHT_BLOCK_XML.replace("<width>8</width>", "");
        let err = parse_opencv_cascade(&xml).unwrap_err();
        assert!(err.to_string().contains("<width>"));
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_opencv_cascade("<opencv_storage><cascade>").unwrap_err();
        assert!(matches!(err, CascadeError::Xml(_)));
    }
}
