//! CloudFormation template model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use vela_core::DeploymentUnit;

use crate::TemplateError;
use crate::case_convert::{attributes_to_json, value_to_json};
use crate::schemas;
use crate::validation::validate_unit;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties", default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Json>,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateOutput {
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Value")]
    pub value: Json,
    #[serde(rename = "Export", default, skip_serializing_if = "Option::is_none")]
    pub export: Option<TemplateExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateExport {
    #[serde(rename = "Name")]
    pub name: String,
}

impl Template {
    /// Validate `unit` and render it
    pub fn from_unit(unit: &DeploymentUnit) -> Result<Self, TemplateError> {
        validate_unit(unit).map_err(TemplateError::Validation)?;

        let mut resources = BTreeMap::new();
        for resource in &unit.resources {
            let config = schemas::config_for(resource.resource_type()).ok_or_else(|| {
                TemplateError::UnsupportedResourceType(resource.resource_type().to_string())
            })?;

            // References are implicit dependencies; only explicit ordering is listed
            let mut depends_on = resource.depends_on.clone();
            depends_on.sort();
            depends_on.dedup();

            resources.insert(
                resource.logical_id().to_string(),
                TemplateResource {
                    resource_type: config.aws_type_name.to_string(),
                    properties: attributes_to_json(&resource.attributes),
                    depends_on,
                },
            );
        }

        let outputs = unit
            .outputs
            .iter()
            .map(|output| {
                (
                    output.id.clone(),
                    TemplateOutput {
                        description: output.description.clone(),
                        value: value_to_json(&output.value),
                        export: output
                            .export_name
                            .clone()
                            .map(|name| TemplateExport { name }),
                    },
                )
            })
            .collect();

        log::debug!(
            "rendered template for {} with {} resources",
            unit.name,
            resources.len()
        );

        Ok(Self {
            format_version: FORMAT_VERSION.to_string(),
            description: unit.description.clone(),
            resources,
            outputs,
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, TemplateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Number of resources per CloudFormation type
    pub fn type_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for resource in self.resources.values() {
            *counts.entry(resource.resource_type.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vela_core::blueprint::network_stack;
    use vela_core::config::NetworkStackConfig;
    use vela_core::topology::{Network, NetworkProps};
    use vela_core::{Resource, Stack};

    fn reference_template() -> Template {
        let unit = network_stack(&NetworkStackConfig::default())
            .unwrap()
            .synthesize()
            .unwrap();
        Template::from_unit(&unit).unwrap()
    }

    #[test]
    fn reference_template_types() {
        let template = reference_template();
        let counts = template.type_counts();

        assert_eq!(counts["AWS::EC2::VPC"], 1);
        assert_eq!(counts["AWS::EC2::Subnet"], 4);
        assert_eq!(counts["AWS::EC2::NatGateway"], 2);
        assert_eq!(counts["AWS::EC2::EIP"], 2);
        assert_eq!(counts["AWS::EC2::SecurityGroup"], 1);
        assert_eq!(counts["AWS::EC2::NetworkAcl"], 1);
        assert_eq!(counts["AWS::EC2::NetworkAclEntry"], 2);
        assert_eq!(counts["AWS::EC2::SubnetNetworkAclAssociation"], 2);
        assert_eq!(template.outputs.len(), 2);
    }

    #[test]
    fn acl_entries_render_as_cloudformation() {
        let template = reference_template();

        let inbound = &template.resources["InboundHttp"];
        assert_eq!(inbound.resource_type, "AWS::EC2::NetworkAclEntry");
        assert_eq!(inbound.properties["NetworkAclId"], json!({ "Ref": "CustomNACL" }));
        assert_eq!(inbound.properties["RuleNumber"], json!(100));
        assert_eq!(inbound.properties["Protocol"], json!(6));
        assert_eq!(inbound.properties["RuleAction"], json!("allow"));
        assert_eq!(inbound.properties["Egress"], json!(false));
        assert_eq!(inbound.properties["CidrBlock"], json!("0.0.0.0/0"));
        assert_eq!(inbound.properties["PortRange"], json!({ "From": 80, "To": 80 }));

        let outbound = &template.resources["OutboundHttps"];
        assert_eq!(outbound.properties["Egress"], json!(true));
        assert_eq!(outbound.properties["PortRange"], json!({ "From": 443, "To": 443 }));
    }

    #[test]
    fn security_group_rules_render() {
        let template = reference_template();
        let sg = &template.resources["InstanceSecurityGroup"];

        assert_eq!(
            sg.properties["GroupDescription"],
            json!("Security Group for EC2 in private subnet")
        );
        assert_eq!(
            sg.properties["SecurityGroupIngress"],
            json!([{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow SSH",
                "FromPort": 22,
                "IpProtocol": "tcp",
                "ToPort": 22
            }])
        );
        assert_eq!(
            sg.properties["SecurityGroupEgress"],
            json!([{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow HTTPS Out",
                "FromPort": 443,
                "IpProtocol": "tcp",
                "ToPort": 443
            }])
        );
    }

    #[test]
    fn outputs_use_intrinsics() {
        let template = reference_template();
        assert_eq!(template.outputs["VpcId"].value, json!({ "Ref": "CustomVPC" }));
        assert_eq!(
            template.outputs["SecurityGroupId"].value,
            json!({ "Fn::GetAtt": ["InstanceSecurityGroup", "GroupId"] })
        );
    }

    #[test]
    fn agnostic_subnets_select_zones() {
        let template = reference_template();
        let subnet = &template.resources["CustomVPCPublicSubnet2Subnet"];
        assert_eq!(
            subnet.properties["AvailabilityZone"],
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
    }

    #[test]
    fn explicit_ordering_becomes_depends_on() {
        let template = reference_template();
        let route = &template.resources["CustomVPCPublicSubnet1DefaultRoute"];
        assert_eq!(route.depends_on, vec!["CustomVPCVPCGW".to_string()]);

        let nat = &template.resources["CustomVPCPublicSubnet1NATGateway"];
        assert_eq!(
            nat.depends_on,
            vec![
                "CustomVPCPublicSubnet1DefaultRoute".to_string(),
                "CustomVPCPublicSubnet1RouteTableAssociation".to_string(),
            ]
        );
    }

    #[test]
    fn serialized_template_parses_back() {
        let template = reference_template();
        let text = template.to_json_pretty().unwrap();
        assert!(text.contains("\"AWSTemplateFormatVersion\": \"2010-09-09\""));
        assert_eq!(Template::from_json_str(&text).unwrap(), template);
    }

    #[test]
    fn invalid_unit_is_not_rendered() {
        let mut stack = Stack::new("Test");
        Network::declare(&mut stack, "Vpc", NetworkProps::default()).unwrap();
        let mut unit = stack.synthesize().unwrap();
        unit.resources.push(Resource::new("s3_bucket", "Logs"));

        assert!(matches!(
            Template::from_unit(&unit),
            Err(TemplateError::Validation(_))
        ));
    }
}
